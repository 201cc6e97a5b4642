pub mod case;
pub mod loaders;
pub mod locator;
pub mod profile;
pub mod report;
pub mod value;

pub use case::{CaseFailure, CaseOutcome, CaseRecord, ResultRecord};
pub use loaders::{load_cases, load_profile};
pub use locator::{ControlPath, ElementKind, ElementProps, Locator, StatePredicate, TitlePattern};
pub use profile::{CompletionSignal, DialogRule, FieldBinding, OutputBinding, Profile};
pub use report::RunReport;
pub use value::{FieldValue, ValueKind};
