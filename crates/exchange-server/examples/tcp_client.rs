//! Interactive client: type CSV requests, they are validated locally,
//! sent as JSON lines, and the replies are printed back as CSV.

use std::env;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use exchange_protocol::csv_codec::{format_output, parse_input_line};
use exchange_protocol::json_codec::{decode_response, encode_request};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[tokio::main]
async fn main() -> Result<()> {
    let addr = env::var("EXCHANGE_CLIENT_ADDR").unwrap_or_else(|_| "127.0.0.1:9000".to_string());

    println!("Connecting to {}...", addr);
    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut replies = BufReader::new(read_half).lines();
    println!("Connected.");
    println!("Type CSV commands like:");
    println!("  R, alice");
    println!("  B, alice, AAPL, 10");
    println!("  N, alice, AAPL, 149.50, 5, B");
    println!("  P, alice");
    println!("Type 'quit' or 'exit' to leave.\n");

    let stdin = io::stdin();

    loop {
        print!(">> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!("\nEOF on stdin, exiting client.");
            break;
        }

        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            println!("Exiting client.");
            break;
        }

        let request = match parse_input_line(trimmed) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("Could not parse line: {err}");
                continue;
            }
        };

        let mut payload = encode_request(&request)?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;

        // Print everything that arrives shortly after the request.
        while let Ok(reply) = timeout(Duration::from_millis(200), replies.next_line()).await {
            match reply? {
                Some(text) => match decode_response(&text) {
                    Ok(response) => println!("<< {}", format_output(&response).replace('\n', "\n<< ")),
                    Err(err) => eprintln!("Undecodable reply ({err}): {text}"),
                },
                None => {
                    println!("Server closed the connection.");
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}
