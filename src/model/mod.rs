pub mod architecture;
pub mod checkpoint;
pub mod data;
pub mod early_stopping;
pub mod evaluation;
pub mod loss;
pub mod training;
