mod cli;
mod main_actions;

use clap::Parser;
use cli::{Cli, Commands, ManifestCommands};
use faas_router::consts::PKG_NAME;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", format!("{PKG_NAME}=info,hyper=off,kube=off"));
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_level(true)
        .with_ansi(true)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let manifest_path = cli.manifest.path;

    let result = match cli.command {
        Commands::Route {
            function,
            store,
            runtime,
        } => main_actions::route(&manifest_path, function, store, runtime).await,
        Commands::Plan { store, runtime } => {
            main_actions::plan(&manifest_path, store, runtime).await
        }
        Commands::Reconcile {
            store,
            runtime,
            backend,
        } => main_actions::reconcile(&manifest_path, store, runtime, backend).await,
        Commands::Fingerprint { resource } => {
            main_actions::print_fingerprint(&manifest_path, resource).await
        }
        Commands::Manifest { command } => match command {
            ManifestCommands::Validate {} => main_actions::validate_manifest(&manifest_path).await,
            ManifestCommands::Print {} => main_actions::print_manifest(&manifest_path).await,
        },
        Commands::Run {
            store,
            runtime,
            backend,
            reconcile_interval_seconds,
        } => {
            main_actions::run(
                &manifest_path,
                store,
                runtime,
                backend,
                reconcile_interval_seconds,
            )
            .await
        }
    };

    if let Err(error) = result {
        tracing::error!("{:#}", error);
        std::process::exit(1);
    }
}
