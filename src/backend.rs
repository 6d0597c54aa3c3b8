use std::collections::{HashMap, VecDeque};
use std::fs;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use lang_component::io::{IoControl, Signal};

/// One queued drawing operation for the next presented frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        text: String,
        x: f32,
        y: f32,
        color: (u8, u8, u8),
    },
    Image {
        name: String,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        angle: f32,
        flip_x: bool,
        flip_y: bool,
    },
}

/// Audio requests queue until the message pump can reach the audio context.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioOp {
    Sound(String),
    Music(String),
    Silence,
}

/// The window-side half of the I/O control interface. The backend itself
/// holds no graphics handles; it queues operations that the event handler
/// realizes, the same way the VM hands operations to its host.
pub struct Backend {
    pending: Vec<DrawOp>,
    frame: Vec<DrawOp>,
    audio: VecDeque<AudioOp>,
    signal: i64,
    clear_color: (u8, u8, u8),
    pace_until: Option<Instant>,
    resources: HashMap<String, String>,
    buttons: HashMap<String, i64>,
    rng: rand::rngs::ThreadRng,
}

fn channel(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

// `name=value` lines; missing files just mean no entries.
fn read_map_file(name: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    match fs::read_to_string(name) {
        Ok(text) => {
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    map.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }
        Err(_) => debug!(name, "no such file, starting empty"),
    }
    map
}

impl Backend {
    pub fn new(resources: &str, buttons: &str) -> Self {
        let resources = read_map_file(resources);
        let buttons = read_map_file(buttons)
            .into_iter()
            .filter_map(|(key, code)| match code.parse::<i64>() {
                Ok(code) => Some((key, code)),
                Err(_) => {
                    warn!(%key, %code, "ignoring non-numeric button code");
                    None
                }
            })
            .collect();

        Backend {
            pending: Vec::new(),
            frame: Vec::new(),
            audio: VecDeque::new(),
            signal: 0,
            clear_color: (0, 0, 0),
            pace_until: None,
            resources,
            buttons,
            rng: rand::thread_rng(),
        }
    }

    /// The last refreshed frame's operations, in draw order.
    pub fn frame(&self) -> &[DrawOp] {
        &self.frame
    }

    pub fn clear_color(&self) -> (u8, u8, u8) {
        self.clear_color
    }

    pub fn resource_path(&self, name: &str) -> Option<&str> {
        self.resources.get(name).map(|path| path.as_str())
    }

    pub fn next_audio(&mut self) -> Option<AudioOp> {
        self.audio.pop_front()
    }

    pub fn pace_deadline(&self) -> Option<Instant> {
        self.pace_until
    }

    pub fn clear_pace(&mut self) {
        self.pace_until = None;
    }

    pub fn key_signal(&self, key_name: &str) -> Option<i64> {
        self.buttons.get(key_name).copied()
    }

    pub fn press(&mut self, code: i64) {
        self.signal = code;
    }

    pub fn release(&mut self, code: i64) {
        if self.signal == code {
            self.signal = 0;
        }
    }
}

impl IoControl for Backend {
    fn output_text(&mut self, text: &str, x: i64, y: i64, red: i64, green: i64, blue: i64) {
        self.pending.push(DrawOp::Text {
            text: text.to_string(),
            x: x as f32,
            y: y as f32,
            color: (channel(red), channel(green), channel(blue)),
        });
    }

    fn draw_image(
        &mut self,
        name: &str,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        angle: i64,
        flip_x: i64,
        flip_y: i64,
    ) {
        self.pending.push(DrawOp::Image {
            name: name.to_string(),
            x: x as f32,
            y: y as f32,
            width: width as f32,
            height: height as f32,
            angle: angle as f32,
            flip_x: flip_x != 0,
            flip_y: flip_y != 0,
        });
    }

    fn refresh(&mut self) {
        self.frame = std::mem::take(&mut self.pending);
    }

    fn play_sound(&mut self, name: &str) {
        self.audio.push_back(AudioOp::Sound(name.to_string()));
    }

    fn play_music(&mut self, name: &str) {
        self.audio.push_back(AudioOp::Music(name.to_string()));
    }

    fn silence(&mut self) {
        self.audio.push_back(AudioOp::Silence);
    }

    fn read_signal(&mut self) -> Signal {
        Signal { code: self.signal }
    }

    fn timeout(&mut self, ms: i64) {
        self.pace_until = Some(Instant::now() + Duration::from_millis(ms.max(0) as u64));
    }

    fn color(&mut self, red: i64, green: i64, blue: i64) {
        self.clear_color = (channel(red), channel(green), channel(blue));
    }

    fn get_random_number(&mut self, lo: i64, hi: i64) -> i64 {
        if lo >= hi {
            lo
        } else {
            self.rng.gen_range(lo..=hi)
        }
    }
}

#[cfg(test)]
mod backend_test {
    use super::*;

    fn backend() -> Backend {
        Backend::new("no_such_resources", "no_such_buttons")
    }

    #[test]
    fn test_refresh_publishes_the_pending_frame() {
        let mut backend = backend();
        backend.output_text("hi", 1, 2, 255, 255, 255);
        assert!(backend.frame().is_empty());

        backend.refresh();
        assert_eq!(backend.frame().len(), 1);

        // The next frame starts empty.
        backend.refresh();
        assert!(backend.frame().is_empty());
    }

    #[test]
    fn test_color_channels_clamp() {
        let mut backend = backend();
        backend.color(-5, 300, 128);
        assert_eq!(backend.clear_color(), (0, 255, 128));
    }

    #[test]
    fn test_signal_press_and_release() {
        let mut backend = backend();
        assert_eq!(backend.read_signal().code, 0);
        backend.press(3);
        assert_eq!(backend.read_signal().code, 3);
        backend.release(9);
        assert_eq!(backend.read_signal().code, 3);
        backend.release(3);
        assert_eq!(backend.read_signal().code, 0);
    }

    #[test]
    fn test_audio_queues_in_order() {
        let mut backend = backend();
        backend.play_sound("beep");
        backend.silence();
        assert_eq!(backend.next_audio(), Some(AudioOp::Sound("beep".to_string())));
        assert_eq!(backend.next_audio(), Some(AudioOp::Silence));
        assert_eq!(backend.next_audio(), None);
    }

    #[test]
    fn test_random_bounds() {
        let mut backend = backend();
        for _ in 0..32 {
            let n = backend.get_random_number(2, 5);
            assert!((2..=5).contains(&n));
        }
        assert_eq!(backend.get_random_number(7, 7), 7);
        assert_eq!(backend.get_random_number(9, 2), 9);
    }
}
