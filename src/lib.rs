//! # ladderpath-vocab
//!
//! Turns a large collection of DNA sequences into a ranked token vocabulary
//! by running ladderpath decompositions over size-bounded batches.
//!
//! ## Usage
//!
//! ```bash
//! ladderpath-vocab run hg19_gene_annotation.csv [-j workers] [-l max-length] [--dry-run]
//! ladderpath-vocab merge ./hg19_json_file
//! ladderpath-vocab vocab ./hg19_json_file [-k top-k]
//! ```
//!
//! ## Modules
//!
//! - `sequence` - Sequence sources, fragment cleaning and lazy batching
//! - `decompose` - Contract with the external decomposition routine
//! - `worker` - Per-batch processing and artifact persistence
//! - `orchestrator` - Wave-bounded or pooled dispatch of isolated workers
//! - `artifact` - Per-batch poset-multiset files
//! - `aggregate` - Merging artifacts and ranking the vocabulary
//! - `config` - Layered run configuration
//! - `subprocess` - Subprocess abstraction layer for testing
//! - `error` - Coded error type shared by every module
//! - `cli` - Command-line interface
pub mod aggregate;
pub mod artifact;
pub mod cli;
pub mod config;
pub mod decompose;
pub mod error;
pub mod orchestrator;
pub mod sequence;
pub mod subprocess;
pub mod worker;
