use std::collections::HashMap;
use std::time::Instant;

use ggez::{
    audio::{SoundSource, Source},
    event::EventHandler,
    graphics::{self, Color, DrawParam, Image, Text},
    input::keyboard::KeyInput,
    Context, GameError, GameResult,
};
use glam::vec2;
use tracing::warn;

use lang_component::memory::Memory;
use lang_vm::VM;

use crate::backend::{AudioOp, Backend, DrawOp};

/// The time budget of one VM slice per pump tick.
const SLICE_MS: u64 = 20;

pub struct Game {
    memory: Memory,
    vm: VM,
    backend: Backend,
    images: HashMap<String, Image>,
    music: Option<Source>,
}

impl Game {
    pub fn new(memory: Memory, vm: VM, backend: Backend) -> Self {
        Game {
            memory,
            vm,
            backend,
            images: HashMap::new(),
            music: None,
        }
    }

    fn image(&mut self, ctx: &mut Context, name: &str) -> GameResult<&Image> {
        if !self.images.contains_key(name) {
            let path = self
                .backend
                .resource_path(name)
                .ok_or_else(|| GameError::CustomError(format!("unknown image {}", name)))?;
            let image = Image::from_path(ctx, path)?;
            self.images.insert(name.to_string(), image);
        }
        Ok(&self.images[name])
    }

    fn drain_audio(&mut self, ctx: &mut Context) -> GameResult<()> {
        while let Some(op) = self.backend.next_audio() {
            match op {
                AudioOp::Sound(name) => match self.backend.resource_path(&name) {
                    Some(path) => {
                        let mut source = Source::new(ctx, path)?;
                        source.play_detached(ctx)?;
                    }
                    None => warn!(%name, "unknown sound"),
                },
                AudioOp::Music(name) => {
                    if let Some(mut playing) = self.music.take() {
                        playing.stop(ctx)?;
                    }
                    match self.backend.resource_path(&name) {
                        Some(path) => {
                            let mut source = Source::new(ctx, path)?;
                            source.set_repeat(true);
                            source.play(ctx)?;
                            self.music = Some(source);
                        }
                        None => warn!(%name, "unknown music"),
                    }
                }
                AudioOp::Silence => {
                    if let Some(mut playing) = self.music.take() {
                        playing.stop(ctx)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl EventHandler for Game {
    fn update(&mut self, ctx: &mut Context) -> GameResult<()> {
        // A pending `timeout` command pauses execution, not the window.
        if let Some(deadline) = self.backend.pace_deadline() {
            if Instant::now() < deadline {
                return Ok(());
            }
            self.backend.clear_pace();
        }

        if let Err(err) = self.vm.run(&mut self.memory, &mut self.backend, SLICE_MS) {
            println!("{}", err);
            ctx.request_quit();
            return Ok(());
        }

        self.drain_audio(ctx)
    }

    fn draw(&mut self, ctx: &mut Context) -> GameResult<()> {
        let (red, green, blue) = self.backend.clear_color();
        let mut canvas = graphics::Canvas::from_frame(ctx, Color::from_rgb(red, green, blue));

        let frame = self.backend.frame().to_vec();
        for op in frame {
            match op {
                DrawOp::Text { text, x, y, color } => {
                    let text = Text::new(text);
                    let param = DrawParam::default()
                        .dest(vec2(x, y))
                        .color(Color::from_rgb(color.0, color.1, color.2));
                    canvas.draw(&text, param);
                }
                DrawOp::Image {
                    name,
                    x,
                    y,
                    width,
                    height,
                    angle,
                    flip_x,
                    flip_y,
                } => {
                    let image = self.image(ctx, &name)?;
                    let source_w = image.width().max(1) as f32;
                    let source_h = image.height().max(1) as f32;
                    let mut scale = vec2(width / source_w, height / source_h);
                    if flip_x {
                        scale.x = -scale.x;
                    }
                    if flip_y {
                        scale.y = -scale.y;
                    }
                    let param = DrawParam::default()
                        .dest(vec2(x, y))
                        .scale(scale)
                        .rotation(angle.to_radians());
                    canvas.draw(image, param);
                }
            }
        }

        canvas.finish(ctx)
    }

    fn key_down_event(&mut self, _ctx: &mut Context, input: KeyInput, _repeated: bool) -> GameResult<()> {
        if let Some(keycode) = input.keycode {
            if let Some(code) = self.backend.key_signal(&format!("{:?}", keycode)) {
                self.backend.press(code);
            }
        }
        Ok(())
    }

    fn key_up_event(&mut self, _ctx: &mut Context, input: KeyInput) -> GameResult<()> {
        if let Some(keycode) = input.keycode {
            if let Some(code) = self.backend.key_signal(&format!("{:?}", keycode)) {
                self.backend.release(code);
            }
        }
        Ok(())
    }
}
