use clap::Parser;
use rfpdf::{LaunchConfig, Margins, RenderOptions};
use std::io::{self, Read};
use std::path::PathBuf;

/// Convert an HTML file to PDF with headless Chrome
#[derive(Parser, Debug)]
#[command(name = "rfpdf", version, about)]
struct Cli {
    /// HTML input file, or `-` for stdin
    input: PathBuf,

    /// PDF output file
    #[arg(short, long)]
    output: PathBuf,

    /// JSON file with render options; flags below override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Base URL for relative resources; requests to its origin are allowed
    #[arg(long)]
    base_url: Option<String>,

    /// Let the page fetch from any host
    #[arg(long)]
    allow_remote_resources: bool,

    /// Run page scripts
    #[arg(long)]
    enable_scripts: bool,

    /// Maximum input length in characters (0 = unlimited)
    #[arg(long)]
    max_content_length: Option<usize>,

    /// Network idle / print timeout in milliseconds (0 = none)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Paper format (A0-A6, Letter, Legal, Tabloid, Ledger)
    #[arg(long)]
    paper_format: Option<String>,

    #[arg(long)]
    scale: Option<f64>,

    /// Do not print background graphics
    #[arg(long)]
    no_background: bool,

    #[arg(long)]
    landscape: bool,

    /// Margin on all sides as a CSS length, e.g. `1cm`
    #[arg(long)]
    margin: Option<String>,

    /// Browser executable (defaults to $CHROME_PATH or auto-detection)
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Disable the browser sandbox (needed in some containers)
    #[arg(long)]
    no_sandbox: bool,
}

impl Cli {
    fn render_options(&self) -> anyhow::Result<RenderOptions> {
        let mut opts = match &self.options {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => RenderOptions::default(),
        };
        if self.base_url.is_some() {
            opts.base_url = self.base_url.clone();
        }
        if self.allow_remote_resources {
            opts.allow_remote_resources = true;
        }
        if self.enable_scripts {
            opts.disable_scripting = false;
        }
        if let Some(n) = self.max_content_length {
            opts.max_content_length = n;
        }
        if let Some(ms) = self.timeout_ms {
            opts.timeout_ms = ms;
        }
        if let Some(format) = &self.paper_format {
            opts.paper_format = format.clone();
        }
        if let Some(scale) = self.scale {
            opts.scale = scale;
        }
        if self.no_background {
            opts.print_background = false;
        }
        if self.landscape {
            opts.landscape = true;
        }
        if let Some(margin) = &self.margin {
            opts.margins = Margins::uniform(margin.clone());
        }
        Ok(opts)
    }

    fn launch_config(&self) -> LaunchConfig {
        let mut cfg = LaunchConfig::from_env();
        if self.chrome_path.is_some() {
            cfg.chrome_path = self.chrome_path.clone();
        }
        if self.no_sandbox {
            cfg.sandbox = false;
        }
        cfg
    }

    fn read_input(&self) -> io::Result<String> {
        if self.input.as_os_str() == "-" {
            let mut html = String::new();
            io::stdin().read_to_string(&mut html)?;
            Ok(html)
        } else {
            std::fs::read_to_string(&self.input)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let html = cli.read_input()?;
    let options = cli.render_options()?;

    let converter = rfpdf::Converter::chrome(cli.launch_config());
    let result = converter.convert(&html, Some(&options), None).await;
    if let Err(e) = converter.close().await {
        log::warn!("Browser shutdown failed: {}", e);
    }

    let pdf = result?;
    std::fs::write(&cli.output, &pdf)?;
    log::info!("Wrote {} bytes to {}", pdf.len(), cli.output.display());
    Ok(())
}
