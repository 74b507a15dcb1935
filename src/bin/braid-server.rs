// ABOUTME: Production server binary for the braid DAG-chat core
// ABOUTME: Loads environment configuration, initializes logging, and serves HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

#![deny(unsafe_code)]

//! # Braid Server Binary
//!
//! Starts the HTTP/SSE chat server with configuration from the environment
//! (optionally a `.env` file). Command-line flags override the bind address.

use anyhow::Result;
use braid_server::{config::ServerConfig, logging, server};
use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(name = "braid-server")]
#[command(about = "Braid - DAG-of-messages chat server")]
struct Args {
    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }

    info!("Starting braid server");
    info!("{}", config.summary());

    server::serve(config).await?;
    Ok(())
}
