//! File subcommands, run directly against the configured store.

use clap::{Args, Subcommand};

use crate::app::{App, FetchRequest, RemoteSource};
use crate::cli::args::ArgsError;
use crate::cli::{GlobalArgs, InputSource, OutputSink, Result};

// =============================================================================
// Files Subcommands
// =============================================================================

/// File subcommands.
#[derive(Subcommand, Debug)]
pub enum FilesCommand {
    /// List every file in the store.
    List(ListArgs),

    /// Print a file's content.
    Cat(CatArgs),

    /// Create a new file.
    Create(CreateArgs),

    /// Overwrite an existing file's content.
    Save(SaveArgs),

    /// Rename a file.
    Mv(MvArgs),

    /// Delete a file.
    Rm(RmArgs),

    /// Copy a file from a Bitbucket repository into the store.
    Fetch(FetchArgs),
}

impl FilesCommand {
    /// Run the files subcommand.
    pub async fn run(self, app: &App, global: &GlobalArgs) -> Result<()> {
        match self {
            FilesCommand::List(args) => args.run(app, global).await,
            FilesCommand::Cat(args) => args.run(app, global).await,
            FilesCommand::Create(args) => args.run(app, global).await,
            FilesCommand::Save(args) => args.run(app, global).await,
            FilesCommand::Mv(args) => args.run(app, global).await,
            FilesCommand::Rm(args) => args.run(app, global).await,
            FilesCommand::Fetch(args) => args.run(app, global).await,
        }
    }
}

// =============================================================================
// List
// =============================================================================

/// Arguments for the list command.
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub output: OutputSink,
}

impl ListArgs {
    pub async fn run(self, app: &App, global: &GlobalArgs) -> Result<()> {
        let files = app.list_files().await?;

        if global.json {
            self.output.write_json(&files).await?;
            return Ok(());
        }

        let output = files
            .iter()
            .map(|entry| {
                let modified = entry
                    .modified
                    .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!("{:>10}  {}  {}", entry.size, modified, entry.path)
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.output.write_str(&output).await?;
        Ok(())
    }
}

// =============================================================================
// Cat
// =============================================================================

/// Arguments for the cat command.
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Path of the file within the store.
    pub path: String,

    #[command(flatten)]
    pub output: OutputSink,
}

impl CatArgs {
    pub async fn run(self, app: &App, global: &GlobalArgs) -> Result<()> {
        let document = app.read_file(&self.path).await?;
        if global.json {
            self.output.write_json(&document).await?;
        } else {
            self.output.write_bytes(document.content.as_bytes()).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Create / Save
// =============================================================================

/// Arguments for the create command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Path of the new file within the store.
    pub path: String,

    /// File content. Read from --input-file or stdin when omitted.
    pub content: Option<String>,

    #[command(flatten)]
    pub input: InputSource,

    #[command(flatten)]
    pub output: OutputSink,
}

impl CreateArgs {
    pub async fn run(self, app: &App, global: &GlobalArgs) -> Result<()> {
        let content = self.input.read(self.content.as_deref()).await?;
        app.create_file(&self.path, &content).await?;
        write_done(&self.output, global, &self.path, "created").await
    }
}

/// Arguments for the save command.
#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Path of an existing file within the store.
    pub path: String,

    /// New content. Read from --input-file or stdin when omitted.
    pub content: Option<String>,

    #[command(flatten)]
    pub input: InputSource,

    #[command(flatten)]
    pub output: OutputSink,
}

impl SaveArgs {
    pub async fn run(self, app: &App, global: &GlobalArgs) -> Result<()> {
        let content = self.input.read(self.content.as_deref()).await?;
        app.save_file(&self.path, &content).await?;
        write_done(&self.output, global, &self.path, "saved").await
    }
}

// =============================================================================
// Mv / Rm
// =============================================================================

/// Arguments for the mv command.
#[derive(Args, Debug)]
pub struct MvArgs {
    pub from: String,
    pub to: String,

    #[command(flatten)]
    pub output: OutputSink,
}

impl MvArgs {
    pub async fn run(self, app: &App, global: &GlobalArgs) -> Result<()> {
        app.rename_file(&self.from, &self.to).await?;
        write_done(&self.output, global, &self.to, "renamed").await
    }
}

/// Arguments for the rm command.
#[derive(Args, Debug)]
pub struct RmArgs {
    pub path: String,

    #[command(flatten)]
    pub output: OutputSink,
}

impl RmArgs {
    pub async fn run(self, app: &App, global: &GlobalArgs) -> Result<()> {
        app.delete_file(&self.path).await?;
        write_done(&self.output, global, &self.path, "deleted").await
    }
}

// =============================================================================
// Fetch
// =============================================================================

/// Arguments for the fetch command.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Bitbucket web or API URL of the file.
    #[arg(long, conflicts_with_all = ["repository", "path", "branch"])]
    pub url: Option<String>,

    /// Repository as workspace/repo_slug, or a configured repository name.
    #[arg(long, requires = "path")]
    pub repository: Option<String>,

    /// Path of the file within the repository.
    #[arg(long, requires = "repository")]
    pub path: Option<String>,

    /// Branch, tag or commit. Defaults to the repository's configured branch.
    #[arg(long)]
    pub branch: Option<String>,

    /// Store path to write. Defaults to the remote file's name.
    #[arg(long)]
    pub target: Option<String>,

    /// Overwrite the target if it already exists.
    #[arg(long)]
    pub refresh: bool,

    #[command(flatten)]
    pub output: OutputSink,
}

impl FetchArgs {
    fn to_request(&self) -> std::result::Result<FetchRequest, ArgsError> {
        let source = match (&self.url, &self.repository, &self.path) {
            (Some(url), _, _) => RemoteSource::Url(url.clone()),
            (None, Some(repository), Some(path)) => RemoteSource::Reference {
                repository: repository.clone(),
                path: path.clone(),
                branch: self.branch.clone(),
            },
            _ => {
                return Err(ArgsError::InvalidArgs(
                    "specify either --url or both --repository and --path".to_string(),
                ))
            }
        };

        let mut request = FetchRequest::new(source).with_refresh(self.refresh);
        request.target = self.target.clone();
        Ok(request)
    }

    pub async fn run(self, app: &App, global: &GlobalArgs) -> Result<()> {
        let request = self.to_request()?;
        let outcome = app.fetch_remote(&request).await?;

        if global.json {
            self.output.write_json(&outcome).await?;
        } else {
            let verb = if outcome.created { "created" } else { "updated" };
            self.output
                .write_str(&format!("{} {} from {}", verb, outcome.path, outcome.source))
                .await?;
        }
        Ok(())
    }
}

/// Report a completed write as `{"path", "status"}` or a short line.
async fn write_done(output: &OutputSink, global: &GlobalArgs, path: &str, status: &str) -> Result<()> {
    if global.json {
        output
            .write_json(&serde_json::json!({ "path": path, "status": status }))
            .await?;
    } else {
        output.write_str(&format!("{} {}", status, path)).await?;
    }
    Ok(())
}
