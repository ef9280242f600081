//! Replay a procedurally generated "map" through the synthetic viewport and
//! write the stitched result.
//! Run with: cargo run --example replay_canvas

use image::{Rgba, RgbaImage};
use rfmosaic::store::MemoryTileStore;
use rfmosaic::viewport::CanvasViewport;
use rfmosaic::{Mosaic, MosaicConfig, Viewport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("RFox Mosaic - canvas replay\n");

    let config = MosaicConfig {
        viewport: Viewport { width: 320, height: 240 },
        step_fraction: 0.75,
        settle_delay_ms: 0,
        ..Default::default()
    };

    // 4 x 3 tiles of content, aligned to the step so the replay is exact
    let width = 3 * 240 + 320;
    let height = 2 * 180 + 240;
    let source = RgbaImage::from_fn(width, height, |x, y| {
        let grid_line = x % 64 == 0 || y % 64 == 0;
        if grid_line {
            Rgba([40, 40, 40, 255])
        } else {
            Rgba([(x / 4) as u8, (y / 3) as u8, ((x + y) / 8) as u8, 255])
        }
    });

    println!("Canvas: {}x{}", width, height);
    println!("Viewport: {}x{}\n", config.viewport.width, config.viewport.height);

    let mut controller = CanvasViewport::new(source.clone(), config.viewport)?;
    let mut store = MemoryTileStore::new();
    let output = Mosaic::new(config)?.run(&mut controller, &mut store)?;

    println!("Grid: {} columns x {} rows", output.grid.columns, output.grid.rows);
    println!("Pans issued: {}", controller.pan_count());
    println!("Frames captured: {}", controller.capture_count());
    println!(
        "Composite: {}x{} (matches source: {})",
        output.composite.width(),
        output.composite.height(),
        output.composite.image() == &source
    );

    output.composite.save_png("replay_composite.png")?;
    println!("Saved to: replay_composite.png");
    Ok(())
}
