#![cfg(feature = "cdp")]

use rfmosaic::cdp::{CdpViewport, PanMode};
use rfmosaic::store::MemoryTileStore;
use rfmosaic::{Mosaic, MosaicConfig, Viewport};
use std::sync::Once;
use tiny_http::{Response, Server};

static INIT: Once = Once::new();

/// Serve a page much larger than the viewport, with no scrollbars.
fn start_test_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http("127.0.0.1:18090").unwrap();
            for request in server.incoming_requests() {
                let response = match request.url() {
                    "/" => Response::from_string(
                        r#"<!DOCTYPE html>
<html>
<head><title>Mosaic Test Page</title>
<style>
html, body { margin: 0; overflow: hidden; }
::-webkit-scrollbar { display: none; }
#content { width: 1000px; height: 700px;
  background: linear-gradient(135deg, #ff0000, #00ff00 50%, #0000ff); }
</style>
</head>
<body><div id="content"></div></body>
</html>"#,
                    )
                    .with_header(
                        "Content-Type: text/html; charset=utf-8"
                            .parse::<tiny_http::Header>()
                            .unwrap(),
                    ),
                    _ => Response::from_string("Not Found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        // Give the server time to start
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    "http://127.0.0.1:18090".to_string()
}

#[test]
#[ignore] // Requires Chrome to be installed
fn scroll_capture_covers_page() {
    let url = start_test_server();
    let config = MosaicConfig {
        viewport: Viewport { width: 400, height: 300 },
        step_fraction: 0.75,
        settle_delay_ms: 100,
        edge_scan_iteration_cap: 50,
        ..Default::default()
    };

    let mut viewport = CdpViewport::launch(&config, PanMode::Scroll).expect("launch chrome");
    viewport.navigate(&url).expect("navigate");

    let output = Mosaic::new(config)
        .unwrap()
        .run(&mut viewport, &mut MemoryTileStore::new())
        .expect("run");

    assert!(output.grid.columns >= 2, "page is wider than the viewport");
    assert!(output.grid.rows >= 2, "page is taller than the viewport");
    assert!(output.composite.width() >= 1000);
    assert!(output.composite.height() >= 700);

    viewport.close().ok();
}
