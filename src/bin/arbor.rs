use anyhow::Result;
use arbor::merge::{MergeNullValueHandling, PropertyNameComparison};
use arbor::{Document, MergeArrayHandling, MergeSettings, codec};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "arbor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the structural hash of a JSON document.
    Hash { json: String },
    /// Compare two JSON documents structurally.
    Equals { left: String, right: String },
    /// Merge `source` into `target` and print the result.
    Merge {
        target: String,
        source: String,
        #[arg(long, value_enum, default_value_t = Arrays::Concat)]
        arrays: Arrays,
        /// Let incoming nulls overwrite existing values.
        #[arg(long)]
        merge_nulls: bool,
        #[arg(long)]
        ignore_case: bool,
    },
    /// Print the token stream of a JSON document.
    Tokens {
        json: String,
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Arrays {
    Concat,
    Union,
    Replace,
    Merge,
}

impl From<Arrays> for MergeArrayHandling {
    fn from(arrays: Arrays) -> Self {
        match arrays {
            Arrays::Concat => MergeArrayHandling::Concat,
            Arrays::Union => MergeArrayHandling::Union,
            Arrays::Replace => MergeArrayHandling::Replace,
            Arrays::Merge => MergeArrayHandling::Merge,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut doc = Document::new();

    match cli.command {
        Commands::Hash { json } => {
            let root = codec::from_json_str(&mut doc, &json)?;
            println!("{:016x}", doc.deep_hash(root)?);
        }
        Commands::Equals { left, right } => {
            let a = codec::from_json_str(&mut doc, &left)?;
            let b = codec::from_json_str(&mut doc, &right)?;
            let equal = doc.deep_equals(a, b);
            println!("{equal}");
            if !equal {
                std::process::exit(1);
            }
        }
        Commands::Merge {
            target,
            source,
            arrays,
            merge_nulls,
            ignore_case,
        } => {
            let target = codec::from_json_str(&mut doc, &target)?;
            let mut incoming = Document::new();
            let source = codec::from_json_str(&mut incoming, &source)?;
            let settings = MergeSettings {
                array_handling: arrays.into(),
                null_value_handling: if merge_nulls {
                    MergeNullValueHandling::Merge
                } else {
                    MergeNullValueHandling::Ignore
                },
                property_name_comparison: if ignore_case {
                    PropertyNameComparison::IgnoreCase
                } else {
                    PropertyNameComparison::Ordinal
                },
                ..MergeSettings::default()
            };
            doc.merge(target, &incoming, source, Some(&settings))?;
            println!("{}", codec::to_json_value(&doc, target)?);
        }
        Commands::Tokens { json, pretty } => {
            let root = codec::from_json_str(&mut doc, &json)?;
            let encoded = if pretty {
                codec::encode_pretty(&doc, root)?
            } else {
                codec::encode(&doc, root)?
            };
            println!("{encoded}");
        }
    }

    Ok(())
}
