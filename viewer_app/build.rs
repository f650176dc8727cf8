// Build script: compile GLSL shaders to SPIR-V when glslc is available.
// The committed sources under shaders/ are the artifact of record; the
// compiled .spv files land next to them and are read at runtime.

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders");

    let shader_dir = Path::new("shaders");
    let entries = match std::fs::read_dir(shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            println!("cargo:warning=no shaders/ directory found, skipping shader compilation");
            return;
        }
    };

    let glslc = std::env::var("GLSLC").unwrap_or_else(|_| "glslc".to_string());
    let mut compiled = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if extension != "vert" && extension != "frag" {
            continue;
        }

        let out_file = {
            let mut name = path.file_name().unwrap().to_os_string();
            name.push(".spv");
            shader_dir.join(name)
        };

        // recompile only when the source is newer than the output
        let needs_compile = match (std::fs::metadata(&path), std::fs::metadata(&out_file)) {
            (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
                (Ok(src_time), Ok(dst_time)) => src_time > dst_time,
                _ => true,
            },
            _ => true,
        };
        if !needs_compile {
            continue;
        }

        let status = Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status();

        match status {
            Ok(status) if status.success() => {
                compiled += 1;
            }
            Ok(status) => {
                println!(
                    "cargo:warning=glslc failed on {:?} with status {}",
                    path, status
                );
            }
            Err(_) => {
                println!(
                    "cargo:warning=glslc not found; compile {:?} manually or set GLSLC",
                    path
                );
                return;
            }
        }
    }

    if compiled > 0 {
        println!("cargo:warning=compiled {} shader(s)", compiled);
    }
}
