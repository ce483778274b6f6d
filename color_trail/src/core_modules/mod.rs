pub mod centroid;
pub mod classifier;
pub mod color_registry;
pub mod mask;
pub mod pixel;
pub mod refiner;
pub mod renderer;
pub mod shape_extractor;
pub mod trajectory;
