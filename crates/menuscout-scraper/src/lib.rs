pub mod coordinator;
pub mod error;
pub mod http;
pub mod session;
pub mod sink;
pub mod synthetic;
pub mod task;

pub use coordinator::{CoordinatorConfig, ScrapeCoordinator};
pub use error::ScraperError;
pub use http::{HttpSession, HttpSessionFactory};
pub use session::{CancellationFlag, Persist, RawRecord, ScrapeSession, SessionFactory};
pub use sink::{DryRunSink, ProductSink, RestaurantSink};
pub use synthetic::{SyntheticSession, SyntheticSessionFactory};
pub use task::{ScrapeResult, ScrapeTarget, ScrapeTask, Summary};
