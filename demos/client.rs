use argh::FromArgs;
use kornia_narrator::messages::{HealthResponse, NarrationResponse};
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8000;

#[derive(FromArgs)]
/// Narrator client for captioning images and fetching the spoken result
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Health(HealthCommand),
    Caption(CaptionCommand),
    Analyze(AnalyzeCommand),
    Audio(AudioCommand),
}

#[derive(FromArgs)]
/// Check that the server is up
#[argh(subcommand, name = "health")]
struct HealthCommand {}

#[derive(FromArgs)]
/// Caption an image
#[argh(subcommand, name = "caption")]
struct CaptionCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Caption an image and list the objects in it
#[argh(subcommand, name = "analyze")]
struct AnalyzeCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Download a generated audio file
#[argh(subcommand, name = "audio")]
struct AudioCommand {
    /// the audio file name returned by caption or analyze
    #[argh(option, short = 'f')]
    filename: String,

    /// where to write the audio
    #[argh(option, short = 'o')]
    output: PathBuf,
}

fn image_mime(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

async fn upload(
    client: &reqwest::Client,
    url: String,
    image_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(&image_path).await?;
    let file_name = image_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(image_mime(&image_path))?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = client.post(url).multipart(form).send().await?;
    if !response.status().is_success() {
        let error = response.json::<serde_json::Value>().await?;
        println!("Error: {}", serde_json::to_string_pretty(&error)?);
        return Ok(());
    }

    let result = response.json::<NarrationResponse>().await?;
    println!("Result: {}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Health(_) => {
            let result = client
                .get(format!("http://{}/", addr))
                .send()
                .await?
                .json::<HealthResponse>()
                .await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
        }
        ClientCommands::Caption(command) => {
            upload(&client, format!("http://{}/caption", addr), command.image_path).await?;
        }
        ClientCommands::Analyze(command) => {
            upload(&client, format!("http://{}/analyze", addr), command.image_path).await?;
        }
        ClientCommands::Audio(command) => {
            let response = client
                .get(format!("http://{}/audio/{}", addr, command.filename))
                .send()
                .await?
                .error_for_status()?;
            let audio = response.bytes().await?;
            tokio::fs::write(&command.output, &audio).await?;
            println!("Wrote {} bytes to {}", audio.len(), command.output.display());
        }
    }

    Ok(())
}
