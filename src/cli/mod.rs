use clap::{Args, Parser, Subcommand};

use crate::soda::Visibility;

pub mod commands;

#[derive(Parser)]
#[command(name = "soda-workflow")]
#[command(about = "Publishing workflow client for open-data portals")]
#[command(long_about = "soda-workflow drives the long-running publishing operations of a data portal: \
                       publishing, working copies, visibility changes and geocoding. Operations that are \
                       interrupted are saved and can be picked up again with 'soda-workflow resume'.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a dataset, waiting for pending geocoding first
    Publish {
        /// Dataset identifier, e.g. abcd-1234
        dataset_id: String,
    },
    /// Create an unpublished working copy of a dataset
    Copy {
        /// Dataset identifier, e.g. abcd-1234
        dataset_id: String,
    },
    /// Make a dataset public or private
    Visibility {
        /// Dataset identifier, e.g. abcd-1234
        dataset_id: String,
        #[command(flatten)]
        target: VisibilityArg,
        /// Wait for the change to finish instead of leaving it outstanding
        #[arg(long, help = "Poll an accepted change until it completes")]
        wait: bool,
    },
    /// Show pending geocoding for a dataset
    Geocoding {
        /// Dataset identifier, e.g. abcd-1234
        dataset_id: String,
        /// Keep checking until nothing is pending
        #[arg(long, help = "Check repeatedly until geocoding has drained")]
        wait: bool,
    },
    /// Continue polling the operation saved by an interrupted run
    Resume {
        /// Drop the saved operation instead of resuming it
        #[arg(long, help = "Discard the saved operation without polling it")]
        discard: bool,
    },
}

#[derive(Args, Debug, Clone, Copy)]
#[group(required = true, multiple = false)]
pub struct VisibilityArg {
    #[arg(long, help = "Make the dataset publicly readable")]
    pub public: bool,
    #[arg(long, help = "Make the dataset private")]
    pub private: bool,
}

impl VisibilityArg {
    pub fn visibility(&self) -> Visibility {
        if self.public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}
