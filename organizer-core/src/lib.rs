pub mod analyser;
pub mod catalogue;
pub mod db;
pub mod error;
pub mod linker;
pub mod model;
pub mod path;
pub mod registry;
pub mod retry;
pub mod scanner;
pub mod status;

pub use analyser::{AnalyserClient, HttpAnalyserClient};
pub use catalogue::{CatalogueClient, SearchOutcome, TmdbCatalogueClient};
pub use error::{AnalyserError, CatalogueError, ErrorKind, LinkError, MediaError, Result};
pub use linker::{link, LinkOutcome};
pub use model::{CatalogueMatch, Guess, MediaFile, MediaType, Status};
pub use path::{generate_destination, sanitise_title, PathError};
pub use registry::IdentityRegistry;
pub use retry::{retry, RetryPolicy};
pub use scanner::{FilesystemProber, ProbedFile};
pub use status::{allowed, CompletionFields, StatusManager, TransitionOutcome};
