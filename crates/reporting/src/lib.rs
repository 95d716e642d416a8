//! Admin quiz-flow reporting: read models over the quiz tables, the
//! dashboard views, and CSV export.

pub mod dashboard;
pub mod export;
pub mod funnel;
pub mod models;
pub mod query;
pub mod report;
pub mod seed;
pub mod sessions;
pub mod store;

pub use models::{EventSource, OrderStatus, PendingOrder, QuizCompletion, QuizStepEvent};
pub use query::{QuizFlowParams, ReportQuery, View};
pub use report::{QuizFlowReport, ReportOutput};
pub use store::{QuizFlowStore, Window};
