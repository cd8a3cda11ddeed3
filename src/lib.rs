//! # myutils
//!
//! A collection of personal utility functions for LLM batch scripts:
//! a retrying completion wrapper, JSON/JSONL file helpers, a named logger
//! factory and the command-line argument sets shared by step scripts.

pub mod args;
pub mod cli;
pub mod config;
pub mod llm;
pub mod utils;

pub use args::{parse_args, parse_args_benchmark, BenchmarkArgs, ProductionArgs};
pub use config::{create_llm_config, LLMConfig};
pub use llm::{get_llm_response, get_llm_response_blocking, get_llm_response_with, LLMError};
pub use utils::io::{
    add_to_jsonl, iter_jsonl, load_json, load_jsonl, load_md, load_text, load_text_lines,
    save_json, save_jsonl, set_output_dir,
};
pub use utils::logger::{get_logger, init_step_logger, LogSink, Logger, LoggerOptions};
pub use utils::text::clean_json_identifier;
