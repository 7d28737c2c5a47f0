//! Example: Print GeoTIFF metadata and sample a coordinate.
//!
//! Usage: cargo run --example inspect_raster -- <raster.tif> [x y]

use std::env;
use std::time::Instant;
use topobathy_dem::read_geotiff;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 && args.len() != 4 {
        eprintln!("Usage: {} <raster.tif> [x y]", args[0]);
        eprintln!("Example: {} out/topobathy.tif 505000 4005000", args[0]);
        std::process::exit(1);
    }

    let start = Instant::now();
    let raster = match read_geotiff(&args[1]) {
        Ok(raster) => raster,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    println!("Read {} in {:.3}s", args[1], start.elapsed().as_secs_f64());

    let bounds = raster.bounds();
    let t = raster.transform();
    println!("Size: {}x{} pixels", raster.width(), raster.height());
    println!("Pixel size: {} x {}", t.pixel_width, t.pixel_height);
    println!(
        "Bounds: x {:.3} to {:.3}, y {:.3} to {:.3}",
        bounds.xmin, bounds.xmax, bounds.ymin, bounds.ymax
    );
    match raster.crs() {
        Some(crs) => println!("CRS: {}", crs),
        None => println!("CRS: none"),
    }
    println!("Nodata: {}", raster.nodata());
    println!("Stats: {}", raster.stats());

    if args.len() == 4 {
        let (Ok(x), Ok(y)) = (args[2].parse::<f64>(), args[3].parse::<f64>()) else {
            eprintln!("Error: coordinates must be numbers");
            std::process::exit(1);
        };
        match raster.sample_nearest(x, y) {
            Some(value) => println!("Value at ({}, {}): {:.3}", x, y, value),
            None => println!("Value at ({}, {}): missing", x, y),
        }
    }
}
