// ABOUTME: CLI entry point exposing the `server` and `record` subcommands over the control protocol
// ABOUTME: `record --connect ...` bypasses argh's flag grammar since its argv is hand-parsed per the fan-out spec

use argh::FromArgs;
use std::net::SocketAddr;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracecmd_link::config::SessionConfig;
use tracecmd_link::connection::Connection;
use tracecmd_link::fanout::{self, FanOut};
use tracecmd_link::server::ServerSession;

/// Run the trace-cmd link control server: accept one connection at a
/// time, negotiate a capture session, and ingest its metadata to stdout.
#[derive(FromArgs)]
#[argh(subcommand, name = "server")]
struct ServerArgs {
    /// port to listen on
    #[argh(option, short = 'p')]
    port: u16,

    /// redirect log output to this file instead of stdout
    #[argh(option, short = 'l')]
    logfile: Option<String>,

    /// daemonize after startup (log-file wiring only; this crate does not fork)
    #[argh(switch, short = 'D')]
    daemon: bool,

    /// suspend the receive deadline indefinitely
    #[argh(switch, short = 'd')]
    debug: bool,
}

fn usage(program: &str) -> ! {
    eprintln!("usage: {program} server -p PORT [-l LOGFILE] [-D] [-d]");
    eprintln!("       {program} record --connect HOST [params...] [--connect HOST [params...] ...]");
    std::process::exit(1);
}

fn init_logging(logfile: Option<&str>) {
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    match logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| {
                    eprintln!("creating log file {path}: {e}");
                    std::process::exit(1);
                });
            let subscriber = FmtSubscriber::builder()
                .with_max_level(Level::TRACE)
                .with_writer(std::sync::Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("setting default subscriber failed");
        }
        None => {
            let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("setting default subscriber failed");
        }
    }
}

async fn run_server(args: ServerArgs) -> ExitCode {
    init_logging(args.logfile.as_deref());
    if args.daemon {
        tracing::info!("daemon flag set; running in foreground (no fork in this implementation)");
    }

    let addr: SocketAddr = match format!("0.0.0.0:{}", args.port).parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("invalid port {}: {e}", args.port);
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("binding {addr}: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(port = args.port, "starting trace-cmd link server");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        let debug = args.debug;
        tokio::spawn(async move {
            let mut session = ServerSession::new(Connection::new(stream)).with_debug(debug);
            let result: tracecmd_link::error::SessionResult<()> = async {
                let tinit = session.accept_tinit().await?;
                let ports: Vec<u32> = (0..tinit.cpus).map(|i| 40000 + i).collect();
                session.send_rinit(ports).await?;
                let mut sink = tokio::io::stdout();
                session.ingest_metadata(&mut sink).await?;
                Ok(())
            }
            .await;
            if let Err(e) = result {
                tracing::warn!(peer = %peer, error = %e, "session failed");
            }
        });
    }
}

async fn run_record(connect_args: Vec<String>) -> ExitCode {
    let reqs = match fanout::parse_connect_args(&connect_args) {
        Ok(reqs) => reqs,
        Err(e) => {
            eprintln!("parsing --connect arguments: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Trace metadata is read once from stdin and mirrored to every peer in
    // the fan-out, the same bytes each host's recording session streams.
    let mut metadata = Vec::new();
    if let Err(e) =
        tokio::io::AsyncReadExt::read_to_end(&mut tokio::io::stdin(), &mut metadata).await
    {
        eprintln!("reading metadata from stdin: {e}");
        return ExitCode::FAILURE;
    }
    let metadata = std::sync::Arc::new(metadata);

    let fanout = FanOut::new();
    let shutdown = fanout.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let tasks = fanout.spawn_all(reqs, move |req| {
        let metadata = metadata.clone();
        async move {
            let addr = match req.port() {
                Some(port) => format!("{}:{port}", req.host()),
                None => format!("{}:7685", req.host()),
            };
            let stream = match tokio::net::TcpStream::connect(&addr).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(host = %addr, error = %e, "connect failed");
                    return;
                }
            };

            let conn = Connection::new(stream);
            let mut session =
                tracecmd_link::client::ClientSession::new(conn, SessionConfig::new(1, 4096));

            let result: tracecmd_link::error::SessionResult<()> = async {
                session.send_tinit().await?;
                let ports = session.receive_rinit().await?.to_vec();
                tracing::info!(host = %addr, param = %req.param, ?ports, "connected");
                session.send_metadata(&metadata).await?;
                session.close().await?;
                Ok(())
            }
            .await;

            if let Err(e) = result {
                tracing::warn!(host = %addr, error = %e, "record session failed");
            }
        }
    });
    fanout.wait_all(tasks).await;
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().collect();
    let program = args.remove(0);

    if args.is_empty() {
        usage(&program);
    }

    match args[0].as_str() {
        "server" => {
            let rest: Vec<&str> = args[1..].iter().map(String::as_str).collect();
            let server_args = match ServerArgs::from_args(&[program.as_str(), "server"], &rest) {
                Ok(a) => a,
                Err(early_exit) => {
                    print!("{}", early_exit.output);
                    return if early_exit.status.is_ok() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    };
                }
            };
            run_server(server_args).await
        }
        "record" => run_record(args[1..].to_vec()).await,
        _ => usage(&program),
    }
}
