use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (JSON)
    #[arg(long, default_value = crate::config::DEFAULT_PATH)]
    pub config: PathBuf,

    /// Video source: camera index, /dev/videoN, image file or directory, or "synthetic"
    #[arg(short, long)]
    pub device: Option<String>,

    /// Frame rate for file and synthetic sources
    #[arg(long)]
    pub fps: Option<u32>,

    /// Initial chain, comma separated (e.g. "gaussian_blur,grayscale,hough_circle_finder")
    #[arg(long, value_delimiter = ',')]
    pub chain: Option<Vec<String>>,

    /// Run without a window and log detections
    #[arg(long)]
    pub headless: bool,

    /// Stop after this many rendered frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Save the last rendered frame here on exit (headless)
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// List available cameras
    #[arg(long)]
    pub list: bool,

    /// List available algorithms
    #[arg(long)]
    pub list_algorithms: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_comma_separated() {
        let args = Args::parse_from(["rusty_nozzle", "--chain", "grayscale,hough_circle_finder", "--headless"]);
        assert_eq!(
            args.chain.as_deref(),
            Some(&["grayscale".to_string(), "hough_circle_finder".to_string()][..])
        );
        assert!(args.headless);
        assert_eq!(args.config, PathBuf::from("rusty_nozzle.json"));
    }

    #[test]
    fn defaults_leave_config_in_charge() {
        let args = Args::parse_from(["rusty_nozzle"]);
        assert!(args.device.is_none());
        assert!(args.fps.is_none());
        assert!(args.chain.is_none());
        assert!(!args.list_algorithms);
    }
}
