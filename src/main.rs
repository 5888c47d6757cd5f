use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use manga_localizer::{Command, Config, ScrapeArgs, TranslateArgs};

#[derive(Parser, Debug)]
#[command(
    name = "manga-localizer",
    version,
    about = "Scrape, OCR, translate and re-typeset manga chapters"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings", global = true)]
    settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Download every page image of a chapter into its own folder
    Scrape {
        url: String,
        #[command(flatten)]
        scrape: ScrapeFlags,
    },
    /// OCR and group the images in a folder, printing groups as JSON
    Ocr { folder: String },
    /// Translate and typeset every image in a chapter folder
    Translate {
        folder: String,
        #[command(flatten)]
        translate: TranslateFlags,
    },
    /// Scrape a chapter, then translate it
    Run {
        url: String,
        #[command(flatten)]
        scrape: ScrapeFlags,
        #[command(flatten)]
        translate: TranslateFlags,
    },
    /// List font files in the fonts directory
    Fonts,
}

#[derive(Args, Debug)]
struct ScrapeFlags {
    /// CSS selector for page images (default from settings)
    #[arg(short = 's', long = "selector")]
    selector: Option<String>,

    /// Space separated image class names (e.g. "reader-img lazy")
    #[arg(short = 'c', long = "class")]
    class_names: Option<String>,

    /// Parent directory for chapter folders
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<String>,
}

#[derive(Args, Debug)]
struct TranslateFlags {
    /// Model name (e.g. gpt-4o-mini, gemini-2.0-flash, llama3)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Reply format requested from the model: keyed, ordered or lines
    #[arg(short = 'f', long = "format")]
    format: Option<String>,

    /// Target language (e.g. Thai)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Font file inside the fonts directory
    #[arg(long = "font")]
    font: Option<String>,

    /// Fixed font size; disables automatic fitting
    #[arg(long = "font-size")]
    font_size: Option<u32>,

    /// Pixels removed from each edge of a balloon before typesetting
    #[arg(long = "padding")]
    padding: Option<i32>,

    /// Also write translated/groups_<name>.png with the detected balloons
    #[arg(long = "debug-groups")]
    debug_groups: bool,
}

impl From<ScrapeFlags> for ScrapeArgs {
    fn from(flags: ScrapeFlags) -> Self {
        ScrapeArgs {
            selector: flags.selector,
            class_names: flags.class_names,
            output_dir: flags.output_dir,
        }
    }
}

impl From<TranslateFlags> for TranslateArgs {
    fn from(flags: TranslateFlags) -> Self {
        TranslateArgs {
            model: flags.model,
            key: flags.key,
            format: flags.format,
            lang: flags.lang,
            font: flags.font,
            font_size: flags.font_size,
            padding: flags.padding,
            debug_groups: flags.debug_groups,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    manga_localizer::logging::init(cli.verbose)?;

    let command = match cli.command {
        CliCommand::Scrape { url, scrape } => Command::Scrape {
            url,
            args: scrape.into(),
        },
        CliCommand::Ocr { folder } => Command::Ocr { folder },
        CliCommand::Translate { folder, translate } => Command::Translate {
            folder,
            args: translate.into(),
        },
        CliCommand::Run {
            url,
            scrape,
            translate,
        } => Command::Run {
            url,
            scrape: scrape.into(),
            translate: translate.into(),
        },
        CliCommand::Fonts => Command::Fonts,
    };

    let output = manga_localizer::run(Config {
        settings_path: cli.settings,
        command,
    })
    .await?;

    println!("{}", output);
    Ok(())
}
