pub mod catalog;
pub mod geometry;
pub mod locator;
pub mod pick;
pub mod records;
pub mod table;

pub use catalog::{Catalog, CatalogEntry, Track};
pub use geometry::{Geometry, GeometrySample};
pub use locator::{DerivedStage, Product, ProductLocator, ProductPaths};
pub use pick::{read_pick, PickTrace};
pub use records::{
    Bathymetry, BedCoefficients, DerivedRow, SurfaceCoefficients, SurfaceProperties,
    WindowStatistics,
};
