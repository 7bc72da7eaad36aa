//! Template administration CLI
//!
//! Inspect and change how quote emails pick their template.
//!
//! # Usage
//!
//! ```bash
//! # Which template would a Comply e-DOCS SaaS quote use?
//! comply_admin resolve --form comply_edocs --modality saas
//!
//! # Map a template to a form/modality pair
//! comply_admin assign --template <uuid> --form comply_fiscal --modality on-premise
//!
//! # Set the form default and save the resulting configuration
//! comply_admin set-default --form comply_edocs --template <uuid> --save fallback.yaml
//! ```
//!
//! Connection settings come from the `COMPLY_*` environment variables (see
//! `comply_core::settings`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use comply_core::templates::MappingRequest;
use comply_core::{
    FallbackConfig, FormType, QuoteServices, Settings, TemplateError, TemplateResolution,
    TemplateResolver,
};

#[derive(Parser)]
#[command(name = "comply_admin")]
#[command(version)]
#[command(about = "Manage email template mappings and the fallback chain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which template a form/modality pair resolves to
    Resolve {
        /// Form type: comply_edocs, comply_fiscal
        #[arg(long)]
        form: String,

        /// Modality: on-premise, saas
        #[arg(long)]
        modality: String,
    },

    /// Make a template the default for a form type
    SetDefault {
        #[arg(long)]
        form: String,

        /// Template id; omit together with --clear to remove the default
        #[arg(long, required_unless_present = "clear")]
        template: Option<Uuid>,

        #[arg(long, conflicts_with = "template")]
        clear: bool,

        /// Write the resulting configuration here (default: COMPLY_FALLBACK_CONFIG)
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Make a template the global last-resort fallback
    SetGlobal {
        #[arg(long, required_unless_present = "clear")]
        template: Option<Uuid>,

        #[arg(long, conflicts_with = "template")]
        clear: bool,

        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Check whether a form/modality pair is still free
    CheckMapping {
        #[arg(long)]
        form: String,

        #[arg(long)]
        modality: String,

        /// Ignore this template when looking for conflicts
        #[arg(long)]
        exclude: Option<Uuid>,
    },

    /// Map a template to a form/modality pair
    Assign {
        #[arg(long)]
        template: Uuid,

        #[arg(long)]
        form: String,

        #[arg(long)]
        modality: String,
    },

    /// Remove the form/modality mapping of a template
    Unassign {
        #[arg(long)]
        template: Uuid,
    },

    /// Print the active fallback configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,comply_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli.command, cli.format).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<TemplateError>()
                .map(|t| t.code().as_str())
                .unwrap_or("SYSTEM_ERROR");
            if cli.format == OutputFormat::Json {
                let body = serde_json::json!({
                    "success": false,
                    "code": code,
                    "error": format!("{:#}", e),
                });
                println!("{}", body);
            } else {
                eprintln!("{} [{}]: {:#}", "error".red().bold(), code, e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, format: OutputFormat) -> Result<()> {
    let settings = Settings::from_env()?;
    let services = QuoteServices::from_settings(&settings)?;
    let resolver = services.resolver.as_ref();

    match command {
        Commands::Resolve { form, modality } => {
            let pair = MappingRequest::parse(&form, &modality)?;
            let resolution = resolver.resolve(pair.form_type, pair.modality).await?;
            print_resolution(&resolution, format)
        }
        Commands::SetDefault {
            form,
            template,
            clear: _,
            save,
        } => {
            let form_type: FormType = form
                .parse()
                .map_err(TemplateError::InvalidFormType)?;
            match template {
                Some(id) => {
                    if !resolver.set_default_template(form_type, id).await? {
                        return Err(TemplateError::TemplateNotFound { template_id: id }.into());
                    }
                }
                None => resolver.clear_default_template(form_type),
            }
            let save = save.or_else(|| settings.fallback_config_path.clone());
            finish_config_change(resolver, save.as_deref(), format)
        }
        Commands::SetGlobal {
            template,
            clear: _,
            save,
        } => {
            match template {
                Some(id) => {
                    if !resolver.set_global_fallback_template(id).await? {
                        return Err(TemplateError::TemplateNotFound { template_id: id }.into());
                    }
                }
                None => resolver.clear_global_fallback_template(),
            }
            let save = save.or_else(|| settings.fallback_config_path.clone());
            finish_config_change(resolver, save.as_deref(), format)
        }
        Commands::CheckMapping {
            form,
            modality,
            exclude,
        } => {
            let pair = MappingRequest::parse(&form, &modality)?;
            let free = resolver
                .validate_uniqueness(pair.form_type, pair.modality, exclude)
                .await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "formType": pair.form_type,
                    "modality": pair.modality,
                    "available": free,
                })),
                OutputFormat::Pretty => {
                    if free {
                        println!("{} {}/{} is free", "OK".green(), pair.form_type, pair.modality);
                    } else {
                        println!(
                            "{} {}/{} is already mapped",
                            "TAKEN".yellow(),
                            pair.form_type,
                            pair.modality
                        );
                    }
                    Ok(())
                }
            }
        }
        Commands::Assign {
            template,
            form,
            modality,
        } => {
            let pair = MappingRequest::parse(&form, &modality)?;
            let mapped = resolver
                .assign_mapping(template, pair.form_type, pair.modality)
                .await?;
            match format {
                OutputFormat::Json => print_json(&mapped),
                OutputFormat::Pretty => {
                    println!(
                        "{} '{}' now handles {} ({})",
                        "OK".green(),
                        mapped.name,
                        pair.form_type.display_name(),
                        pair.modality
                    );
                    Ok(())
                }
            }
        }
        Commands::Unassign { template } => {
            resolver.clear_mapping(template).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "success": true })),
                OutputFormat::Pretty => {
                    println!("{} mapping removed from {}", "OK".green(), template);
                    Ok(())
                }
            }
        }
        Commands::Config => print_config(&resolver.config(), format),
    }
}

fn finish_config_change(
    resolver: &TemplateResolver,
    save: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let config = resolver.config();
    if let Some(path) = save {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let text = if is_json {
            serde_json::to_string_pretty(&config).context("failed to encode configuration")?
        } else {
            serde_yaml::to_string(&config).context("failed to encode configuration")?
        };
        std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "Fallback configuration saved");
    }
    print_config(&config, format)
}

fn print_resolution(resolution: &TemplateResolution, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(resolution),
        OutputFormat::Pretty => {
            match &resolution.template {
                Some(t) => println!(
                    "{} {} ({}) via {}",
                    "TEMPLATE".green().bold(),
                    t.name,
                    t.id,
                    resolution.fallback_type
                ),
                None => println!("{} no template available", "NONE".red().bold()),
            }
            println!("  {}", resolution.fallback_reason.dimmed());
            Ok(())
        }
    }
}

fn print_config(config: &FallbackConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Pretty => {
            let yaml = serde_yaml::to_string(config).context("failed to encode configuration")?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow!("JSON serialization failed: {}", e))?;
    println!("{}", text);
    Ok(())
}
