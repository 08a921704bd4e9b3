// Build script: compile the GLSL shaders to SPIR-V next to their sources.
// The renderer reads the .spv files at startup (paths in config.toml).

use std::path::Path;
use std::process::Command;

const SHADERS: &[&str] = &["shaders/shader.vert", "shaders/shader.frag"];

fn main() {
    for source in SHADERS {
        println!("cargo:rerun-if-changed={}", source);
        compile_shader(source, &format!("{}.spv", source));
    }
}

fn compile_shader(input: &str, output: &str) {
    // glslc ships with the Vulkan SDK
    let status = Command::new("glslc")
        .arg(Path::new(input))
        .arg("-o")
        .arg(Path::new(output))
        .status();

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("glslc rejected {} (exit code {:?})", input, status.code());
        }
        Err(e) => {
            // A missing compiler breaks startup, not the build
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}", input, output);
        }
    }
}
