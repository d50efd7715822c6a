mod batch;
mod generate;
mod run;

pub use batch::batch;
pub use generate::generate;
pub use run::run;
