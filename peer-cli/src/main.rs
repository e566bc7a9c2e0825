use std::io::{Read, Write};
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use peer::{MetaInfo, PeerId, PeerIdentity, PeerRuntime};
use sha1::Digest;

const DEFAULT_PIECE_LENGTH: u32 = 512 * 1024;
const CLIENT_PREFIX: &[u8; 5] = b"RS001";

#[derive(Parser)]
#[command(name = "peer", about = "Joins or seeds a small BitTorrent-style swarm")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {

    /// Creates a .torrent metafile from a single file.
    Torrent {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        announce: url::Url,

        #[arg(short, long, default_value_t = DEFAULT_PIECE_LENGTH)]
        piece_length: u32,

        #[arg(short, long)]
        destination: PathBuf,
    },

    /// Joins a swarm as a leecher.
    Join {
        #[arg(short, long)]
        torrent: PathBuf,

        #[arg(short, long)]
        output_dir: PathBuf,

        #[arg(long)]
        ip: IpAddr,

        #[arg(short, long)]
        port: u16,
    },

    /// Joins a swarm as a seeder for a file already on disk.
    Seed {
        #[arg(short, long)]
        torrent: PathBuf,

        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        ip: IpAddr,

        #[arg(short, long)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let format = tracing_subscriber::fmt::format();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .event_format(format)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Torrent { file, announce, piece_length, destination } => {
            create_torrent(&file, announce, piece_length, &destination)
        }
        Command::Join { torrent, output_dir, ip, port } => {
            run_peer(&torrent, output_dir, ip, port, false, None).await
        }
        Command::Seed { torrent, file, ip, port } => {
            run_peer(&torrent, file.parent().map(PathBuf::from).unwrap_or_default(), ip, port, true, Some(file)).await
        }
    }
}

// Hashes the input file piece-by-piece and writes the bencoded metafile.
fn create_torrent(file: &std::path::Path, announce: url::Url, piece_length: u32, destination: &std::path::Path) -> Result<()> {
    let mut reader = std::fs::File::open(file).context("opening input file")?;
    let file_length = reader.metadata()?.len();

    let mut hashes = Vec::new();
    let mut buf = vec![0u8; piece_length as usize];
    loop {
        let mut total_read = 0;
        while total_read < buf.len() {
            let n = reader.read(&mut buf[total_read..])?;
            if n == 0 {
                break;
            }
            total_read += n;
        }
        if total_read == 0 {
            break;
        }
        let mut hasher = sha1::Sha1::new();
        hasher.update(&buf[..total_read]);
        hashes.push(hasher.finalize().into());
        if total_read < buf.len() {
            break;
        }
    }

    let name = file.file_name()
        .and_then(|s| s.to_str())
        .context("input file has no usable file name")?
        .to_string();

    let bytes = MetaInfo::create(announce, name, file_length, piece_length, &hashes, Some("peer-cli".to_string()), None)
        .context("encoding metainfo")?;

    let mut out = std::fs::File::create(destination).context("creating torrent file")?;
    out.write_all(&bytes)?;

    println!("Creating torrent from file {}", file.display());
    println!("Saving torrent to {}", destination.display());
    Ok(())
}

async fn run_peer(
    torrent_path: &std::path::Path,
    output_dir: PathBuf,
    ip: IpAddr,
    port: u16,
    is_seeder: bool,
    existing_file: Option<PathBuf>,
) -> Result<()> {
    let metainfo = MetaInfo::load(torrent_path).context("loading torrent")?;

    let identity = PeerIdentity {
        peer_id: PeerId::generate(CLIENT_PREFIX),
        peer_ip: ip,
        peer_port: port,
    };

    let mut runtime = if is_seeder {
        let file_path = existing_file.context("seeding requires an existing file")?;
        PeerRuntime::seed(&metainfo, identity, &file_path)?
    } else {
        std::fs::create_dir_all(&output_dir).ok();
        PeerRuntime::join(&metainfo, identity, &output_dir)?
    };

    runtime.run().await.context("starting peer runtime")?;
    let state = runtime.peer_state();

    if !is_seeder {
        println!("Downloading...");
    }

    loop {
        if state.lock().await.completed() {
            println!();
            let prompt = if is_seeder { "Continue to seed? (yes/no): " } else { "Download successfully, continue to seed? (yes/no): " };
            print!("{prompt}");
            std::io::stdout().flush().ok();

            let mut answer = String::new();
            std::io::stdin().read_line(&mut answer)?;
            if answer.trim() == "no" {
                runtime.stop().await;
                return Ok(());
            }
            println!("Seeding...");
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        } else {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }
}
