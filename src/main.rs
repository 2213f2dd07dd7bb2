use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};

use phishguard::aggregate::RiskPolicy;
use phishguard::features::PageProbe;
use phishguard::loader::{load, spawn_load, ArtifactSource, ModelHandle};

#[derive(Parser)]
#[command(
    name = "phishguard",
    about = "Phishing risk scoring for web pages via a small feed-forward network."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ArtifactArgs {
    /// Structure descriptor (file path or http(s) URL)
    #[arg(long, default_value = "model/structure.json")]
    structure: String,

    /// Weight blob (file path or http(s) URL)
    #[arg(long, default_value = "model/weights.bin")]
    weights: String,
}

#[derive(clap::Args)]
struct PolicyArgs {
    /// Weight of the URL-branch score in the blended total
    #[arg(long, default_value_t = 0.4)]
    url_weight: f32,

    /// Weight of the page-branch score in the blended total
    #[arg(long, default_value_t = 0.6)]
    page_weight: f32,

    /// Total score at or above which a page classifies as phishing
    #[arg(long, default_value_t = 40.0)]
    threshold: f32,
}

impl PolicyArgs {
    fn to_policy(&self) -> RiskPolicy {
        RiskPolicy {
            url_weight: self.url_weight,
            page_weight: self.page_weight,
            threshold: self.threshold,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP analysis service
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// Rate limit in requests per minute per IP (0 = no limit)
        #[arg(long, default_value_t = 60)]
        rate_limit: u32,

        #[command(flatten)]
        artifacts: ArtifactArgs,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Analyze a single URL (local CLI)
    Check {
        /// URL to analyze
        #[arg(long)]
        url: String,

        /// Output format: json or summary
        #[arg(long, default_value = "summary")]
        format: String,

        #[command(flatten)]
        artifacts: ArtifactArgs,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Print topology, parameter count and blob hash for a weight set
    Inspect {
        #[command(flatten)]
        artifacts: ArtifactArgs,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn cmd_serve(bind: String, rate_limit: u32, artifacts: ArtifactArgs, policy: PolicyArgs) -> Result<()> {
    use phishguard::server::{run_server, ServerConfig};

    let bind_addr = bind
        .parse()
        .wrap_err_with(|| format!("Invalid bind address: {}", bind))?;

    let config = ServerConfig {
        bind_addr,
        rate_limit_rpm: rate_limit,
        policy: policy.to_policy(),
    };

    let structure = ArtifactSource::from_arg(&artifacts.structure);
    let weights = ArtifactSource::from_arg(&artifacts.weights);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        // The server accepts requests immediately; until the load completes,
        // scoring degrades to 0 and /health reports weights_loaded=false.
        let handle = ModelHandle::empty();
        spawn_load(handle.clone(), structure, weights);
        run_server(config, handle).await
    })?;

    Ok(())
}

fn cmd_check(url: String, format: String, artifacts: ArtifactArgs, policy: PolicyArgs) -> Result<i32> {
    let structure = ArtifactSource::from_arg(&artifacts.structure);
    let weights = ArtifactSource::from_arg(&artifacts.weights);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let store = load(&structure, &weights)
            .await
            .wrap_err("Failed to load weight artifacts")?;
        let handle = ModelHandle::with_store(store);
        let probe = PageProbe::new();

        let analysis = phishguard::analyze_url(&url, &handle, &probe, &policy.to_policy()).await?;

        match format.as_str() {
            "json" => {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            }
            _ => {
                println!("PhishGuard Analysis");
                println!("===================");
                println!("URL:    {}", analysis.url);
                println!("Badge:  {}", analysis.badge.as_str());
                println!();
                println!("URL score:   {:.1}", analysis.report.url_score);
                println!("Page score:  {:.1}", analysis.report.page_score);
                println!("Total score: {:.1}", analysis.report.total_score);
                println!("Verdict:     {}", analysis.report.verdict.as_str());
            }
        }

        if analysis.report.verdict.is_phishing() {
            Ok(1)
        } else {
            Ok(0)
        }
    })
}

fn cmd_inspect(artifacts: ArtifactArgs) -> Result<()> {
    let structure = ArtifactSource::from_arg(&artifacts.structure);
    let weights = ArtifactSource::from_arg(&artifacts.weights);

    let rt = tokio::runtime::Runtime::new()?;
    let store = rt
        .block_on(load(&structure, &weights))
        .wrap_err("Failed to load weight artifacts")?;

    let topology = store.topology();
    println!("Model:       {}", topology.name);
    println!("Input width: {}", topology.input_width);
    let mut prev = topology.input_width;
    for (i, layer) in topology.layers.iter().enumerate() {
        println!(
            "Layer {}:     {} x {} + {} bias ({:?})",
            i, layer.units, prev, layer.units, layer.activation
        );
        prev = layer.units;
    }
    println!("Parameters:  {}", store.param_count());
    println!("Blob hash:   {}", store.hash());

    Ok(())
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            bind,
            rate_limit,
            artifacts,
            policy,
        } => cmd_serve(bind, rate_limit, artifacts, policy),
        Commands::Check {
            url,
            format,
            artifacts,
            policy,
        } => match cmd_check(url, format, artifacts, policy) {
            Ok(code) => {
                if code != 0 {
                    std::process::exit(code);
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        Commands::Inspect { artifacts } => cmd_inspect(artifacts),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}
