//! # photo-dedup CLI
//!
//! Command-line front-end for the duplicate grouping engine.
//!
//! ## Usage
//! ```bash
//! photo-dedup import features.json
//! photo-dedup group --preset accurate
//! photo-dedup escalate --output json
//! ```

mod cli;

use photo_dedup_engine::Result;

fn main() -> Result<()> {
    photo_dedup_engine::init_tracing();
    cli::run()
}
