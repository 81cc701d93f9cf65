// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # edge-core
//!
//! Command-line interface for the edge-core runtime.
//!
//! ## Usage
//! ```bash
//! # Show the detected CPU layout and capability bits
//! edge-core status --json
//!
//! # Pin the worker pool to the big cores
//! edge-core powersave --mode 2
//!
//! # Load a network and run one forward pass
//! edge-core run --param net.param --model net.bin --input data=3x224x224 --output prob
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "edge-core",
    about = "Layer execution runtime for heterogeneous edge CPUs",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the CPU topology, capability bits and tier masks.
    Status {
        /// Print the topology as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Switch the worker pool to a power mode: 0 (all), 1 (little), 2 (big).
    Powersave {
        #[arg(short, long)]
        mode: i32,
    },

    /// Load a network and run one forward pass on constant-filled inputs.
    Run {
        /// Path to the parameter (graph) file.
        #[arg(short, long)]
        param: std::path::PathBuf,

        /// Path to the binary weight file.
        #[arg(short, long)]
        model: std::path::PathBuf,

        /// Input blob as `name=CxHxW` (repeatable).
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output blob name (repeatable).
        #[arg(short, long, required = true)]
        output: Vec<String>,

        /// Value every input element is filled with.
        #[arg(long, default_value_t = 1.0)]
        fill: f32,

        /// Use the GPU backend regardless of the configuration file.
        #[arg(long)]
        gpu: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Status { json } => commands::status::execute(&config, json),
        Commands::Powersave { mode } => commands::powersave::execute(mode),
        Commands::Run {
            param,
            model,
            input,
            output,
            fill,
            gpu,
        } => commands::run::execute(config, &param, &model, &input, &output, fill, gpu),
    }
}
