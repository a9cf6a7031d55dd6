use crate::preprocess::IMAGE_SIDE;
use itertools::Itertools;
use ndarray::ArrayView1;

// Render a feature vector as rows of shade characters, darker for more ink. Handy for checking
// what the network is actually given after preprocessing.
pub fn render_ascii(features: ArrayView1<f32>) -> String {
    features
        .iter()
        .chunks(IMAGE_SIDE as usize)
        .into_iter()
        .map(|row| row.map(|&ink| shade(ink)).collect::<String>())
        .join("\n")
}

fn shade(ink: f32) -> char {
    match ink {
        a if a < 0.2 => ' ',
        a if a < 0.4 => '░',
        a if a < 0.6 => '▒',
        a if a < 0.8 => '▓',
        _ => '█',
    }
}
