//! The serve subcommand.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;

use crate::app::App;
use crate::cli::Result;
use crate::server;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on, overriding server.bind.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

impl ServeArgs {
    pub async fn run(self, app: Arc<App>) -> Result<()> {
        let addr = self.bind.unwrap_or(app.config().config().server.bind);
        server::serve(app, addr).await?;
        Ok(())
    }
}
