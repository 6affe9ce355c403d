use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use review_core::{decompose, IdGenerator};

/// reviewctl: identifier tooling for the review service
#[derive(Parser, Debug)]
#[command(name = "reviewctl")]
#[command(about = "Generate and inspect review service identifiers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate identifiers as the given node would
    Generate(GenerateArgs),
    /// Split identifiers into timestamp, node and sequence
    Decode(DecodeArgs),
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Node number (0-1023)
    #[arg(long)]
    node: i64,

    /// How many identifiers to print
    #[arg(long, default_value_t = 10)]
    count: usize,
}

#[derive(Parser, Debug)]
struct DecodeArgs {
    /// Identifiers to decode
    #[arg(required = true)]
    ids: Vec<i64>,
}

fn describe(id: i64) -> Result<String> {
    let parts = decompose(id);
    let timestamp = parts
        .timestamp()
        .ok_or_else(|| anyhow!("{} carries an unrepresentable timestamp", id))?;
    Ok(format!(
        "{}\ttime={}\tnode={}\tsequence={}",
        id,
        timestamp.to_rfc3339(),
        parts.node,
        parts.sequence
    ))
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let generator = IdGenerator::new(args.node)
        .with_context(|| format!("Failed to create generator for node {}", args.node))?;
    for _ in 0..args.count {
        println!("{}", describe(generator.next_id())?);
    }
    Ok(())
}

fn run_decode(args: DecodeArgs) -> Result<()> {
    for id in args.ids {
        if id < 0 {
            return Err(anyhow!("{} is not a valid identifier", id));
        }
        println!("{}", describe(id)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => run_generate(args),
        Commands::Decode(args) => run_decode(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_defaults() {
        let cli = Cli::try_parse_from(["reviewctl", "generate", "--node", "7"]).unwrap();
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.node, 7);
                assert_eq!(args.count, 10);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_decode_requires_ids() {
        assert!(Cli::try_parse_from(["reviewctl", "decode"]).is_err());
        let cli = Cli::try_parse_from(["reviewctl", "decode", "1", "2"]).unwrap();
        match cli.command {
            Commands::Decode(args) => assert_eq!(args.ids, vec![1, 2]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_describe_reports_node() {
        let generator = IdGenerator::new(42).unwrap();
        let line = describe(generator.next_id()).unwrap();
        assert!(line.contains("node=42"));
        assert!(line.contains("time=20"));
    }
}
