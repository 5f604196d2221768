use std::path::Path;
use std::{env, process};

use imgcull::config::DEFAULT_THUMBNAIL_HEIGHT;
use imgcull::thumbnail;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <image_file_path> [height]", args[0]);
        process::exit(1);
    }

    let file_path = &args[1];
    let path = Path::new(file_path);
    let height = match args.get(2).map(|h| h.parse::<u32>()) {
        None => DEFAULT_THUMBNAIL_HEIGHT,
        Some(Ok(h)) if h > 0 => h,
        Some(_) => {
            eprintln!("Height must be a positive integer");
            process::exit(1);
        }
    };

    let source = match thumbnail::load_rgba(path) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", file_path, e);
            process::exit(1);
        }
    };

    let thumb = match thumbnail::render_image(&source, height) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error rendering thumbnail: {}", e);
            process::exit(1);
        }
    };

    let [r, g, b, a] = thumb.average_color.0;
    println!("File: {}", file_path);
    println!("Source        : {}x{}", source.width(), source.height());
    println!("Thumbnail     : {}x{}", thumb.image.width(), thumb.image.height());
    println!("Average color : #{:02x}{:02x}{:02x} (alpha {})", r, g, b, a);
}
