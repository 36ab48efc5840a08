//! CLI tool for generating slide decks from a topic.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use deck_core::{
    DeckPipeline, GenerationRequest, ImageResolver, LanguageModel, RawOutput, SlideListParser,
    SlideRecord, SlideValidator, ValidationPolicy,
};
use deck_pptx::{PptxInspector, PptxWriter};
use deck_providers::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use deck_providers::unsplash::DEFAULT_SEARCH_TIMEOUT;
use deck_providers::{
    ChatClient, ChatConfig, CompletionModel, HttpImageFetcher, ImageToolAgent, UnsplashSearch,
};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Generate PowerPoint decks from a topic with a language model.
#[derive(Parser, Debug)]
#[command(name = "deckgen")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the model for a deck on TOPIC and render it
    Generate(GenerateArgs),
    /// Extract and validate slides from saved model output
    Extract(ExtractArgs),
    /// Render a JSON slide list into a .pptx file
    Render(RenderArgs),
    /// Print the titles and bullets of a .pptx file
    Inspect(InspectArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Single completion; images resolved afterwards by search
    Completion,
    /// Tool-calling agent that fetches images itself
    Agent,
}

#[derive(ClapArgs, Debug)]
struct GenerateArgs {
    /// Deck topic
    topic: String,

    /// Number of content slides (1-20)
    #[arg(short = 'n', long, default_value = "5")]
    slides: usize,

    /// Output file (default: <topic>.pptx in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the slide list as JSON instead of writing a deck
    #[arg(short, long)]
    print: bool,

    #[arg(short, long, value_enum, default_value = "completion")]
    mode: Mode,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    images: ImageArgs,

    /// Reject the whole deck if any slide is malformed
    #[arg(long)]
    strict: bool,
}

#[derive(ClapArgs, Debug)]
struct ModelArgs {
    /// API key for the OpenAI-compatible chat endpoint
    #[arg(long, env = "DECKGEN_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Chat endpoint base URL
    #[arg(long, env = "DECKGEN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Model name
    #[arg(long, env = "DECKGEN_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Model request timeout in seconds
    #[arg(long, default_value = "15")]
    timeout: u64,
}

#[derive(ClapArgs, Debug)]
struct ImageArgs {
    /// Unsplash access key; without one, slides have no images
    #[arg(long, env = "UNSPLASH_ACCESS_KEY", hide_env_values = true)]
    unsplash_key: Option<String>,

    /// Concurrent image searches (1-8)
    #[arg(long, default_value = "4")]
    image_concurrency: usize,

    /// Image download timeout in seconds
    #[arg(long, default_value = "15")]
    download_timeout: u64,
}

#[derive(ClapArgs, Debug)]
struct ExtractArgs {
    /// Saved model output: raw text, or a JSON message trace
    input: PathBuf,

    /// Reject the whole list if any slide is malformed
    #[arg(long)]
    strict: bool,
}

#[derive(ClapArgs, Debug)]
struct RenderArgs {
    /// JSON slide list
    input: PathBuf,

    /// Title slide text (default: input file stem)
    #[arg(short, long)]
    topic: Option<String>,

    /// Output file (default: input path with .pptx extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    images: ImageArgs,
}

#[derive(ClapArgs, Debug)]
struct InspectArgs {
    /// Deck to read
    input: PathBuf,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    match &args.command {
        Command::Generate(generate) => run_generate(generate, args.verbose),
        Command::Extract(extract) => run_extract(extract),
        Command::Render(render) => run_render(render, args.verbose),
        Command::Inspect(inspect) => run_inspect(inspect),
    }
}

fn run_generate(args: &GenerateArgs, verbose: bool) -> Result<()> {
    let request = GenerationRequest::new(&args.topic, args.slides);
    if request.topic.is_empty() {
        anyhow::bail!("Topic must not be empty");
    }
    if request.slide_count != args.slides {
        log::warn!("Slide count {} clamped to {}", args.slides, request.slide_count);
    }

    let config = ChatConfig::new(&args.model.api_key)
        .with_base_url(&args.model.base_url)
        .with_model(&args.model.model)
        .with_timeout(Duration::from_secs(args.model.timeout));
    let client = ChatClient::new(config).context("Failed to configure the language model")?;
    let search = image_search(&args.images)?;

    let validator = SlideValidator::new().with_policy(if args.strict {
        ValidationPolicy::RejectBatch
    } else {
        ValidationPolicy::DropInvalid
    });

    let completion = CompletionModel::new(client.clone());
    let slides = match args.mode {
        Mode::Completion => run_pipeline(&completion, None, search.as_ref(), validator, args, &request)?,
        Mode::Agent => {
            let search = search
                .as_ref()
                .context("Agent mode needs an Unsplash access key (--unsplash-key)")?;
            let agent = ImageToolAgent::new(client, search);
            run_pipeline(&agent, Some(&completion), Some(search), validator, args, &request)?
        }
    };

    if verbose {
        eprintln!("  Generated {} slides", slides.len());
    }

    if args.print {
        println!("{}", serde_json::to_string_pretty(&slides)?);
        return Ok(());
    }

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&request.topic));
    write_deck(&slides, &request.topic, &output_path, &args.images)?;
    if verbose {
        eprintln!("Written to: {}", output_path.display());
    }
    Ok(())
}

fn run_pipeline(
    model: &dyn LanguageModel,
    fallback: Option<&dyn LanguageModel>,
    search: Option<&UnsplashSearch>,
    validator: SlideValidator,
    args: &GenerateArgs,
    request: &GenerationRequest,
) -> Result<Vec<SlideRecord>> {
    let mut pipeline = DeckPipeline::new(model)
        .with_validator(validator)
        .with_image_concurrency(args.images.image_concurrency);
    if let Some(fallback) = fallback {
        pipeline = pipeline.with_fallback(fallback);
    }
    if let Some(search) = search {
        pipeline = pipeline.with_image_search(search);
    }

    match pipeline.generate(request) {
        Ok(slides) => Ok(slides),
        Err(e) => {
            if let Some(raw) = e.raw_output() {
                eprintln!("Model output:\n{}", raw);
            }
            Err(anyhow::Error::new(e)
                .context(format!("Failed to generate slides for '{}'", request.topic)))
        }
    }
}

fn run_extract(args: &ExtractArgs) -> Result<()> {
    let input = read_text(&args.input)?;
    let output = RawOutput::from_json_str(&input);

    let extraction = deck_core::extract(&output)
        .with_context(|| format!("No slides found in {}", args.input.display()))?;
    if extraction.slides.is_empty() {
        let images: Vec<&str> = extraction
            .resolved_images
            .iter()
            .map(|url| url.as_deref().unwrap_or("(none)"))
            .collect();
        anyhow::bail!(
            "{} only contains tool results, no slide list. Images in order: {}",
            args.input.display(),
            images.join(", ")
        );
    }

    let policy = if args.strict {
        ValidationPolicy::RejectBatch
    } else {
        ValidationPolicy::DropInvalid
    };
    let slides = SlideValidator::new()
        .with_policy(policy)
        .validate_slides(&extraction.slides)
        .context("Extracted slides are invalid")?;

    println!("{}", serde_json::to_string_pretty(&slides)?);
    Ok(())
}

fn run_render(args: &RenderArgs, verbose: bool) -> Result<()> {
    let input = read_text(&args.input)?;
    let raw_slides = SlideListParser::new()
        .parse(&input)
        .with_context(|| format!("No slide list in {}", args.input.display()))?;
    let mut slides = SlideValidator::new()
        .validate_slides(&raw_slides)
        .context("Slide list is invalid")?;

    if let Some(search) = image_search(&args.images)? {
        slides = ImageResolver::new(&search)
            .with_concurrency(args.images.image_concurrency)
            .resolve(slides);
    }

    let topic = args.topic.clone().unwrap_or_else(|| {
        args.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Presentation")
            .replace('_', " ")
    });
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("pptx"));

    write_deck(&slides, &topic, &output_path, &args.images)?;
    if verbose {
        eprintln!("Written to: {}", output_path.display());
    }
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let slides = PptxInspector::new()
        .inspect(BufReader::new(file))
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&slides)?);
        return Ok(());
    }

    for slide in &slides {
        let picture = if slide.has_picture { " [picture]" } else { "" };
        println!("{}. {}{}", slide.number, slide.title, picture);
        for bullet in &slide.bullets {
            println!("   - {}", bullet);
        }
    }
    Ok(())
}

/// Unsplash search, when a key is configured.
fn image_search(args: &ImageArgs) -> Result<Option<UnsplashSearch>> {
    match args.unsplash_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => {
            let search = UnsplashSearch::new(key, DEFAULT_SEARCH_TIMEOUT)
                .context("Failed to configure image search")?;
            Ok(Some(search))
        }
        _ => {
            log::info!("No Unsplash access key; slides will have no images");
            Ok(None)
        }
    }
}

fn write_deck(slides: &[SlideRecord], topic: &str, output_path: &Path, images: &ImageArgs) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let fetcher = HttpImageFetcher::new(Duration::from_secs(images.download_timeout))
        .context("Failed to configure image download")?;
    PptxWriter::new()
        .with_image_source(&fetcher)
        .render(slides, topic, output_path)
        .with_context(|| format!("Failed to write {}", output_path.display()))
}

/// `<topic>.pptx` with spaces and path separators replaced.
fn default_output_path(topic: &str) -> PathBuf {
    let stem: String = topic
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    PathBuf::from(format!("{}.pptx", stem))
}

fn read_text(path: &Path) -> Result<String> {
    let mut content = String::new();
    File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .read_to_string(&mut content)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path("AI in Healthcare"),
            PathBuf::from("AI_in_Healthcare.pptx")
        );
        assert_eq!(default_output_path("a/b"), PathBuf::from("a_b.pptx"));
    }

    #[test]
    fn test_generate_arguments() {
        let args = Args::try_parse_from([
            "deckgen",
            "generate",
            "Rust",
            "-n",
            "3",
            "--mode",
            "agent",
            "--api-key",
            "k",
        ])
        .unwrap();
        match args.command {
            Command::Generate(generate) => {
                assert_eq!(generate.slides, 3);
                assert_eq!(generate.mode, Mode::Agent);
                assert_eq!(generate.model.timeout, 15);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_extract_tool_only_trace_reports_images() {
        let input = std::env::temp_dir().join(format!("deckgen-extract-{}.json", std::process::id()));
        std::fs::write(
            &input,
            r#"[{"type": "ai", "content": ""},
                {"type": "tool", "tool_call_id": "c1", "content": "https://img/1.jpg"},
                {"type": "tool", "tool_call_id": "c2", "content": "No relevant image found."}]"#,
        )
        .unwrap();

        let err = run_extract(&ExtractArgs {
            input: input.clone(),
            strict: false,
        })
        .unwrap_err();
        std::fs::remove_file(&input).unwrap();

        let message = err.to_string();
        assert!(message.contains("https://img/1.jpg, (none)"), "{}", message);
    }
}
