/// A non-blocking input reading. Code 0 means "no input".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signal {
    pub code: i64,
}

/// The audiovisual backend as the virtual machine sees it. Implementations
/// receive values by copy and never reach back into program memory.
pub trait IoControl {
    fn output_text(&mut self, text: &str, x: i64, y: i64, red: i64, green: i64, blue: i64);

    #[allow(clippy::too_many_arguments)]
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
    );

    fn refresh(&mut self);

    fn play_sound(&mut self, name: &str);
    fn play_music(&mut self, name: &str);
    fn silence(&mut self);

    fn read_signal(&mut self) -> Signal;

    /// Asks the backend to pace the next operation by `ms` milliseconds.
    fn timeout(&mut self, ms: i64);

    fn color(&mut self, red: i64, green: i64, blue: i64);

    /// A uniform random integer in `[lo, hi]`, both ends inclusive.
    fn get_random_number(&mut self, lo: i64, hi: i64) -> i64;
}
