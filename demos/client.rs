//! Client demo: dial the echo server, send one payload, print the echo.
//!
//! Run the `echo_server` demo first, then `cargo run --example client`.

use bytes::Bytes;
use wsock::Event;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut socket = wsock::connect(8080, None);

    while let Some(event) = socket.next_event().await {
        match event {
            Event::Connect => {
                println!("connected to {}", socket.address().address);
                socket.write(Bytes::from_static(b"hello over websocket"));
            }
            Event::Data(data) => {
                println!("echoed back: {} bytes", data.len());
                socket.end(None);
            }
            Event::Error(err) => eprintln!("error: {err}"),
            Event::Close => break,
            _ => {}
        }
    }

    Ok(())
}
