// Build script to compile GLSL shaders to SPIR-V

use std::path::Path;
use std::process::Command;

const SHADERS: &[&str] = &[
    "shaders/sample.vert",
    "shaders/sample.frag",
    "shaders/gui.vert",
    "shaders/gui.frag",
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    for shader in SHADERS {
        compile_shader(shader, &format!("{}.spv", shader));
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=compile manually: glslc {} -o {}", input, output);
        }
    }
}
