pub mod compositor;
pub mod meme;
