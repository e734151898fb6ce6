pub mod bundle;
pub mod contained;
pub mod datatypes;
pub mod questionnaire;
pub mod response;
pub mod step;
pub mod value_set;
