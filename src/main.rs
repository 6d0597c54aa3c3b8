mod backend;
mod config;
mod game;

use std::env;

use anyhow::Context as _;
use ggez::{
    conf::{WindowMode, WindowSetup},
    event, ContextBuilder,
};
use tracing::info;

use lang_component::memory::Memory;
use lang_vm::VM;

use crate::{backend::Backend, config::Config, game::Game};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <program>", args[0]);
        println!("Done.");
        return;
    }

    // Compile and host errors print to standard output and the process
    // exits normally.
    if let Err(err) = run(&args[1]) {
        println!("{:#}", err);
        println!("Done.");
    }
}

fn run(program: &str) -> anyhow::Result<()> {
    let config = Config::load("Config")?;

    let mut memory = Memory::new(config.get("memory")?.max(0) as usize);
    lang_compiler::compile_file(program, &mut memory)?;
    info!(program, memory = memory.size(), "program compiled");

    let width = config.get("width")? as f32;
    let height = config.get("height")? as f32;
    let entry = config.get("program")?;

    let backend = Backend::new("Resources", "Buttons");
    let vm = VM::new(entry);

    let title = format!("{} v{}", program, env!("CARGO_PKG_VERSION"));
    let window_setup = WindowSetup::default().title(&title);
    let window_mode = WindowMode::default()
        .dimensions(width, height)
        .resizable(false);

    let (ctx, event_loop) = ContextBuilder::new("clesh", "clesh")
        .window_setup(window_setup)
        .window_mode(window_mode)
        .add_resource_path(env::current_dir()?)
        .build()
        .context("cannot create ggez context")?;

    let game = Game::new(memory, vm, backend);
    event::run(ctx, event_loop, game)
}
