//! # Argument Sets
//!
//! Command-line arguments shared by step scripts: one set for production
//! runs over a whole dataset and one for benchmark runs over a sample.

use clap::Parser;

/// Arguments for production mode.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(about = "Run LLM benchmark or production mode.")]
pub struct ProductionArgs {
    /// Maximum number of items to process
    #[arg(short = 'n', long = "max_items")]
    pub max_items: Option<usize>,
    /// Overwrite output file if exists
    #[arg(short = 'f', long = "force_overwrite")]
    pub force_overwrite: bool,
}

/// Arguments for benchmark mode.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(about = "Run LLM benchmark or production mode.")]
pub struct BenchmarkArgs {
    /// Sample size for the benchmark
    #[arg(short = 'n', long = "sample_size", default_value_t = 50)]
    pub sample_size: usize,
    /// Overwrite output file if exists
    #[arg(short = 'f', long = "force_overwrite")]
    pub force_overwrite: bool,
    /// Name of the test task to run (e.g., q1, q2...)
    #[arg(long, default_value = "q2")]
    pub task: String,
}

/// Parses the production arguments of the current process.
pub fn parse_args() -> ProductionArgs {
    ProductionArgs::parse()
}

/// Parses the benchmark arguments of the current process.
pub fn parse_args_benchmark() -> BenchmarkArgs {
    BenchmarkArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_production_defaults() {
        let args = ProductionArgs::try_parse_from(["step03"]).unwrap();
        assert_eq!(
            args,
            ProductionArgs {
                max_items: None,
                force_overwrite: false
            }
        );
    }

    #[test]
    fn test_production_flags() {
        let args = ProductionArgs::try_parse_from(["step03", "-n", "10", "-f"]).unwrap();
        assert_eq!(args.max_items, Some(10));
        assert!(args.force_overwrite);

        let args =
            ProductionArgs::try_parse_from(["step03", "--max_items", "3", "--force_overwrite"])
                .unwrap();
        assert_eq!(args.max_items, Some(3));
        assert!(args.force_overwrite);
    }

    #[test]
    fn test_production_rejects_non_integer() {
        assert!(ProductionArgs::try_parse_from(["step03", "-n", "many"]).is_err());
    }

    #[test]
    fn test_benchmark_defaults() {
        let args = BenchmarkArgs::try_parse_from(["bench"]).unwrap();
        assert_eq!(args.sample_size, 50);
        assert!(!args.force_overwrite);
        assert_eq!(args.task, "q2");
    }

    #[test]
    fn test_benchmark_overrides() {
        let args = BenchmarkArgs::try_parse_from([
            "bench",
            "--sample_size",
            "5",
            "-f",
            "--task",
            "q1",
        ])
        .unwrap();
        assert_eq!(args.sample_size, 5);
        assert!(args.force_overwrite);
        assert_eq!(args.task, "q1");
    }

    #[test]
    fn test_commands_are_well_formed() {
        ProductionArgs::command().debug_assert();
        BenchmarkArgs::command().debug_assert();
    }
}
