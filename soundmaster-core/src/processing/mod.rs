pub mod equalizer;
pub mod pcm;
pub mod stereo_gain;
