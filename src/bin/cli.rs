use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use rudis::{Client, Error, Outcome, Request};

const PORT: u16 = 6379;

/// Interactive command line client.
#[derive(Parser, Debug)]
struct Args {
    /// The host to connect to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// The port to connect to
    #[arg(short, long, default_value_t = PORT)]
    port: u16,

    /// Database index to select after connecting
    #[arg(short, long, default_value_t = 0)]
    db: u16,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let mut client = Client::connect(addr.clone()).await?;
    if args.db != 0 {
        client.select(args.db).await?.value()?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(format!("{}> ", addr).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };

        if keyword.eq_ignore_ascii_case("quit") || keyword.eq_ignore_ascii_case("exit") {
            client.quit().await?;
            break;
        }

        let mut request = Request::new(keyword.to_uppercase());
        for token in tokens {
            request.append(&token);
        }

        match client.command(request).await {
            Ok(Outcome::Done(frame)) => println!("{}", frame),
            Ok(Outcome::Queued) => println!("QUEUED"),
            // Server-reported errors keep the session alive.
            Err(Error::Server(message)) => println!("(error) {}", message),
            Err(err) => return Err(err),
        }
    }

    Ok(())
}
