//! Command-line parsing.

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fedfs_core::{RepoPath, Request};

/// fedfs - browse and copy filesystem trees federated into a repository
#[derive(Parser, Debug)]
#[command(
    name = "fedfs",
    version,
    about = "Browse and copy filesystem trees federated into a content repository"
)]
pub struct Cli {
    /// Configuration file (falls back to $FEDFS_CONFIG)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Print views as JSON
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Kind, size and Last-Modified of a federated path
    Stat { path: String },
    /// List a federated container
    Ls { path: String },
    /// Write a resource's content to stdout, following external-content links
    Cat { path: String },
    /// Copy between the federation and the native store
    Cp {
        source: String,
        destination: String,
        /// Replace an existing destination
        #[arg(long)]
        overwrite: bool,
    },
    /// Serve a native resource's content from a federated file
    Link {
        resource: String,
        /// Federation URI, or a repository path under a mount
        target: String,
    },
}

fn repo_path(raw: &str) -> io::Result<RepoPath> {
    Ok(RepoPath::new(raw)?)
}

impl Command {
    /// The dispatchable request for this command; `None` for `link`, which
    /// edits the native graph instead.
    pub fn request(&self) -> io::Result<Option<Request>> {
        let request = match self {
            Command::Stat { path } => Request::Head {
                target: repo_path(path)?,
            },
            Command::Ls { path } => Request::Get {
                target: repo_path(path)?,
            },
            Command::Cat { path } => Request::GetContent {
                target: repo_path(path)?,
            },
            Command::Cp {
                source,
                destination,
                overwrite,
            } => Request::Copy {
                target: repo_path(source)?,
                destination: repo_path(destination)?,
                overwrite: *overwrite,
            },
            Command::Link { .. } => return Ok(None),
        };
        Ok(Some(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_cli(s: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(s.split_whitespace())
    }

    #[test]
    fn test_parse_stat_with_global_flags() {
        let cli = parse_cli("fedfs stat /files/ds1 -v --config fedfs.toml").unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("fedfs.toml")));
        assert_eq!(
            cli.command,
            Command::Stat {
                path: "/files/ds1".to_string()
            }
        );
    }

    #[test]
    fn test_cp_maps_to_copy_request() {
        let cli = parse_cli("fedfs cp /files/ds1 /objects/ds1 --overwrite").unwrap();
        let request = cli.command.request().unwrap().unwrap();
        assert_eq!(
            request,
            Request::Copy {
                target: RepoPath::new("/files/ds1").unwrap(),
                destination: RepoPath::new("/objects/ds1").unwrap(),
                overwrite: true,
            }
        );
    }

    #[test]
    fn test_read_commands_map_to_requests() {
        let ls = parse_cli("fedfs ls /files").unwrap().command.request().unwrap();
        assert!(matches!(ls, Some(Request::Get { .. })));
        let cat = parse_cli("fedfs cat /obj").unwrap().command.request().unwrap();
        assert!(matches!(cat, Some(Request::GetContent { .. })));
        let stat = parse_cli("fedfs stat /files").unwrap().command.request().unwrap();
        assert!(matches!(stat, Some(Request::Head { .. })));
    }

    #[test]
    fn test_link_is_not_a_request() {
        let cli = parse_cli("fedfs link /obj /files/ds1").unwrap();
        assert_eq!(cli.command.request().unwrap(), None);
    }

    #[test]
    fn test_bad_path_is_invalid_input() {
        let cli = parse_cli("fedfs ls files/../x").unwrap();
        let err = cli.command.request().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(parse_cli("fedfs").is_err());
    }
}
