use std::env;

use anyhow::{anyhow, Result};
use env_logger::Env;

use heat_render::app::{self, RenderConfig, WindowInitError};
use heat_render::{AssetRoot, Lesson, LessonAssets, SceneDesc};

const USAGE: &str = "Usage: heat-render [--lesson <name>] [--assets <dir>] [--check] [--list] [--help]";

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    match options.mode {
        Mode::Help => {
            println!("{USAGE}");
            Ok(())
        }
        Mode::List => {
            for lesson in Lesson::ALL {
                println!("{:<14} {}", lesson.name(), lesson.description());
            }
            Ok(())
        }
        Mode::Check => run_check(&options.config),
        Mode::Interactive => match app::run(options.config.clone()) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --check mode (set DISPLAY or WAYLAND_DISPLAY to enable rendering)."
                    );
                    run_check(&options.config)
                } else {
                    Err(err)
                }
            }
        },
    }
}

fn run_check(config: &RenderConfig) -> Result<()> {
    let (scene, assets) = app::load_lesson(config)?;
    print_summary(&scene, &assets);
    Ok(())
}

fn print_summary(scene: &SceneDesc, assets: &LessonAssets) {
    println!(
        "Lesson {} ({}): {} draw group(s), {} instance(s)",
        scene.lesson,
        scene.lesson.description(),
        scene.groups.len(),
        scene.instance_count()
    );
    for (desc, loaded) in scene.groups.iter().zip(&assets.groups) {
        let uniform_bytes = loaded.program.uniforms().map_or(0, |layout| layout.size());
        println!(
            " - program {}: {} vertex input(s), {uniform_bytes}-byte uniform block, {} texture unit(s); {:?} mesh with {} vertices x {}",
            loaded.program.name(),
            loaded.program.vertex_inputs().len(),
            loaded.program.texture_units(),
            desc.mesh,
            loaded.mesh.vertex_count(),
            desc.instances.len()
        );
    }
    for (path, image) in &assets.textures {
        println!(" - texture {path}: {}x{}", image.width, image.height);
    }
    println!("All {} program(s) compiled and linked.", assets.groups.len());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Interactive,
    Check,
    List,
    Help,
}

struct CliOptions {
    config: RenderConfig,
    mode: Mode,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut config = RenderConfig::default();
        let mut mode = Mode::Interactive;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--lesson" => {
                    let name = args
                        .next()
                        .ok_or_else(|| anyhow!("--lesson expects a name\n{USAGE}"))?;
                    config.lesson = name.parse()?;
                }
                "--assets" => {
                    let dir = args
                        .next()
                        .ok_or_else(|| anyhow!("--assets expects a directory\n{USAGE}"))?;
                    config.assets = AssetRoot::new(dir);
                }
                "--check" => mode = Mode::Check,
                "--list" => mode = Mode::List,
                "--help" | "-h" => mode = Mode::Help,
                other => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
            }
        }
        Ok(Self { config, mode })
    }
}
