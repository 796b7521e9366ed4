use bytes::Bytes;
use clap::{Parser, Subcommand};
use picstash::cache::{fingerprint, shard_path};
use picstash::cascade::DeleteTarget;
use picstash::config;
use picstash::context::Context;
use picstash::parameters::{PATH, Parameters};
use picstash::processor::{ProcessRequest, Processor};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Shared flags for commands that describe a derivative.
#[derive(clap::Args, Clone)]
struct ParamArgs {
    /// Request parameter as key=value; repeat a key to build a list
    #[arg(short = 'p', long = "param", value_parser = parse_pair)]
    params: Vec<(String, String)>,
}

impl ParamArgs {
    fn to_parameters(&self) -> Parameters {
        self.params.iter().cloned().collect()
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw}"))
}

#[derive(Parser)]
#[command(name = "picstash")]
#[command(version)]
#[command(about = "On-demand image derivatives with a content-addressed cache")]
#[command(long_about = "\
On-demand image derivatives with a content-addressed cache

Every derivative is addressed by the MD5 fingerprint of its request
parameters. The first request computes it and stores it in the destination
storage; later requests with the same parameters are served from there.

Examples:

  picstash process cat.jpg -p op=resize -p w=200 -p h=100
  picstash process cat.jpg -p op=thumbnail -p w=64 -p h=64 -p fmt=webp
  picstash process cat.jpg -p op=resize -p op=rotate -p w=200 -p deg=180
  picstash process bg.png -p 'op=op:flat pos:0.0.50.50 path:logo.png'
  picstash delete cat.jpg

Run 'picstash gen-config' to generate a documented picstash.toml.")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "picstash.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Produce derivatives of one or more source images
    Process {
        /// Source paths in the source storage
        paths: Vec<String>,

        #[command(flatten)]
        params: ParamArgs,

        /// Recompute even when the derivative is cached
        #[arg(long)]
        force: bool,

        /// Persist in the background and wait for it before exiting
        #[arg(long = "async")]
        async_persist: bool,

        /// Also write the derivative to this local file (single source only)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a source image and its cached derivatives, or one derivative by key
    Delete {
        /// Source path in the source storage
        path: Option<String>,

        /// Derivative key, used when no path is given
        #[arg(long)]
        key: Option<String>,
    },
    /// Add a local file to the source storage
    Upload {
        file: PathBuf,

        /// Name in the source storage (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the fingerprint and destination shard of a request
    Key {
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Print a stock picstash.toml with all options documented
    GenConfig,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    init_tracing();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Command::Process {
            paths,
            params,
            force,
            async_persist,
            output,
        } => {
            if output.is_some() && paths.len() > 1 {
                return Err("--output needs a single source path".into());
            }
            let processor = Processor::new(Context::from_config(&config)?);
            let base = params.to_parameters();

            let sources: Vec<Option<String>> = if paths.is_empty() {
                vec![None]
            } else {
                paths.into_iter().map(Some).collect()
            };
            for source in sources {
                let mut params = base.clone();
                if let Some(path) = source {
                    params.insert(PATH, path);
                }
                let request = ProcessRequest::new(params)
                    .force(force)
                    .async_persist(async_persist);
                let file = processor.process(&request).await?;
                println!("{}  {}", request.key, file.filepath);
                if let Some(output) = &output {
                    std::fs::write(output, file.content())?;
                }
            }
            processor.flush().await;
            println!("Cache: {}", processor.stats());
        }
        Command::Delete { path, key } => {
            let target = DeleteTarget::from_request(path.as_deref(), key.as_deref())?;
            let processor = Processor::new(Context::from_config(&config)?);
            processor.delete_target(&target).await?;
            println!("Ok");
        }
        Command::Upload { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or("upload needs a file name")?,
            };
            let data = std::fs::read(&file)?;
            let processor = Processor::new(Context::from_config(&config)?);
            let uploaded = processor.upload(&name, Bytes::from(data)).await?;
            println!("{}", uploaded.filepath);
        }
        Command::Key { params } => {
            let key = fingerprint(&params.to_parameters());
            let shard = config.shard;
            println!("{key}");
            println!(
                "{}",
                shard_path(&key, shard.width, shard.depth, shard.rest_only)
            );
        }
        Command::GenConfig => {}
    }

    Ok(())
}
