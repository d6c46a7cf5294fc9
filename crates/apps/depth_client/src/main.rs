use std::path::PathBuf;

use clap::{Parser, Subcommand};
use depth_client::{parse_point, parse_size, upload_file, ClientError, HttpUploader};
use formats::ResponseFormat;
use foundation::Channel;
use runtime::{UploadEncoding, Viewer, ViewerConfig, VisualMode};
use scene::{depth_label, DisplaySize, SamplePolicy};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload images to a depth estimation backend and inspect the result")]
struct Args {
    /// Backend origin (default: $DEPTH_BACKEND_ORIGIN or http://localhost:5000)
    #[arg(long)]
    backend: Option<String>,

    /// JSON viewer config; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Response format: image_channel, compressed_float, normalized_byte, luma16
    #[arg(long, value_parser = parse_format)]
    format: Option<ResponseFormat>,

    /// Upload encoding: multipart or raw
    #[arg(long, value_parser = parse_encoding)]
    encoding: Option<UploadEncoding>,

    /// Channel carrying depth in image responses: red, green, blue, alpha
    #[arg(long, value_parser = parse_channel)]
    channel: Option<Channel>,

    /// Unit suffix for physical depth labels (e.g. ft)
    #[arg(long)]
    unit: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload an image and print the depth buffer summary
    Upload { image: PathBuf },

    /// Upload an image and read the depth under a display position
    Sample {
        image: PathBuf,

        /// Pointer position: X,Y
        #[arg(long, value_parser = parse_point)]
        at: scene::Pointer,

        /// Rendered size of the image: WxH (default: the buffer's own size)
        #[arg(long, value_parser = parse_size)]
        display: Option<DisplaySize>,
    },

    /// Upload an image and export its height mesh as Wavefront OBJ
    Mesh {
        image: PathBuf,

        /// Output file
        #[arg(long, default_value = "depth.obj")]
        out: PathBuf,
    },
}

fn parse_format(s: &str) -> Result<ResponseFormat, String> {
    ResponseFormat::parse(s).ok_or_else(|| format!("unknown format {s:?}"))
}

fn parse_encoding(s: &str) -> Result<UploadEncoding, String> {
    UploadEncoding::parse(s).ok_or_else(|| format!("unknown encoding {s:?}"))
}

fn parse_channel(s: &str) -> Result<Channel, String> {
    Channel::parse(s).ok_or_else(|| format!("unknown channel {s:?}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ViewerConfig::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => ViewerConfig::from_env(),
    };
    if let Some(backend) = args.backend {
        config.backend_origin = backend;
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }
    if let Some(channel) = args.channel {
        config.channel = channel;
    }
    if args.unit.is_some() {
        config.unit = args.unit;
    }
    if matches!(args.command, Command::Mesh { .. }) {
        config.mode = VisualMode::Mesh;
    }
    config.validate()?;

    info!("uploading to {} as {}", config.endpoint_url(), config.format);
    let uploader = HttpUploader::new();
    let mut viewer = Viewer::new(config);

    match args.command {
        Command::Upload { image } => {
            let buffer = upload_file(&mut viewer, &uploader, &image).await?;
            println!("width\t{}", buffer.width());
            println!("height\t{}", buffer.height());
            match buffer.depth_bounds() {
                Some((min, max)) => println!("depth\t{min:.4}..{max:.4}"),
                None => println!("depth\tno finite samples"),
            }
        }
        Command::Sample { image, at, display } => {
            let buffer = upload_file(&mut viewer, &uploader, &image).await?;
            let (display, policy) = match display {
                Some(display) => (display, SamplePolicy::Scaled),
                None => (DisplaySize::of_buffer(&buffer), SamplePolicy::Native),
            };
            let mut config = viewer.config().clone();
            config.sampling = policy;
            viewer.set_config(config);

            match viewer.pointer_move(at, display) {
                Some(sample) => println!(
                    "({}, {}) -> buffer ({}, {}) index {}\t{}",
                    at.x,
                    at.y,
                    sample.buffer_x,
                    sample.buffer_y,
                    sample.index,
                    depth_label(&sample, viewer.config().unit.as_deref())
                ),
                None => println!("no sample"),
            }
        }
        Command::Mesh { image, out } => {
            upload_file(&mut viewer, &uploader, &image).await?;
            let Some(mesh) = viewer.mesh() else {
                return Err(ClientError::Upload("no mesh was built".to_string()).into());
            };
            tokio::fs::write(&out, mesh.to_obj())
                .await
                .map_err(ClientError::Export)?;
            info!("wrote {}", out.display());
            println!(
                "{} vertices, {} segments -> {}",
                mesh.vertex_count(),
                mesh.segment_count(),
                out.display()
            );
        }
    }

    Ok(())
}
