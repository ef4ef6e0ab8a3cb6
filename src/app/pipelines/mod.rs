pub mod distribution_pipeline;
