use flate2::write::GzEncoder;
use flate2::Compression;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

enum Asset {
    Html,
    Css,
    Js,
}

const ASSETS: &[(&str, Asset)] = &[
    ("index.html", Asset::Html),
    ("style.css", Asset::Css),
    ("script.js", Asset::Js),
];

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set by cargo");
    let static_dir = Path::new(&manifest_dir).join("static");

    for (name, kind) in ASSETS {
        println!("cargo:rerun-if-changed=static/{}", name);

        let source_path = static_dir.join(name);
        let source = fs::read_to_string(&source_path)
            .unwrap_or_else(|e| panic!("cannot read {}: {}", source_path.display(), e));

        let minified = match kind {
            Asset::Html => source,
            Asset::Css => minifier::css::minify(&source)
                .unwrap_or_else(|e| panic!("CSS minify failed for {}: {}", name, e))
                .to_string(),
            Asset::Js => minifier::js::minify(&source).to_string(),
        };

        let gz_path = static_dir.join(format!("{}.gz", name));
        compress_with_gzip(minified.as_bytes(), &gz_path)
            .unwrap_or_else(|e| panic!("failed to gzip {}: {}", name, e));
    }
}

fn compress_with_gzip(data: &[u8], output_path: &Path) -> io::Result<()> {
    let output_file = fs::File::create(output_path)?;
    let mut encoder = GzEncoder::new(output_file, Compression::best());
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(())
}
