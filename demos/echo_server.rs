//! Echo server demo.
//!
//! Run with `cargo run --example echo_server`, then point any WebSocket
//! client (or the `client` demo) at ws://127.0.0.1:8080.

use wsock::{Data, Event, Server, ServerEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut server = Server::new(None);
    server.listen(8080, "127.0.0.1").await?;
    println!("listening on ws://127.0.0.1:8080");

    while let Some(event) = server.next_event().await {
        match event {
            ServerEvent::Connection(mut socket) => {
                println!("connection from {}", socket.remote_address());
                tokio::spawn(async move {
                    while let Some(event) = socket.next_event().await {
                        match event {
                            Event::Data(Data::Binary(bytes)) => {
                                socket.write(bytes);
                            }
                            Event::Data(Data::Text(_)) => {}
                            Event::Error(err) => eprintln!("socket error: {err}"),
                            Event::Close => {
                                println!("peer went away");
                                break;
                            }
                            _ => {}
                        }
                    }
                });
            }
            ServerEvent::Error(err) => eprintln!("server error: {err}"),
            ServerEvent::Close => break,
            _ => {}
        }
    }

    Ok(())
}
