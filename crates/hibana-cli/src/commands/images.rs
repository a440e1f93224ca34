//! Images command - generate and optionally save images.

use anyhow::{Context, Result};
use clap::Args;
use hibana_sdk::{
    Client, ImageQuality, ImageRequest, ImageResponseFormat, ImageResult, ImageSize, ImageSource,
    ImageStyle,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the images command.
#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// What to draw
    pub prompt: String,

    /// Image model
    #[arg(short = 'M', long, default_value = "dall-e-3")]
    pub model: String,

    /// Image size (256x256, 512x512, 1024x1024, 1792x1024, 1024x1792)
    #[arg(long, default_value = "1024x1024")]
    pub size: ImageSize,

    /// Quality (standard, hd)
    #[arg(long)]
    pub quality: Option<ImageQuality>,

    /// Style (vivid, natural)
    #[arg(long)]
    pub style: Option<ImageStyle>,

    /// Number of images
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: u32,

    /// Return base64 data instead of hosted URLs
    #[arg(long)]
    pub inline: bool,

    /// Directory to save every image into
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ImagesOutput {
    #[serde(flatten)]
    result: ImageResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    saved: Vec<SavedImage>,
}

#[derive(Debug, Serialize)]
struct SavedImage {
    path: PathBuf,
    bytes: u64,
}

impl ImagesArgs {
    fn to_request(&self) -> ImageRequest {
        let mut request = ImageRequest::new(&self.model, &self.prompt)
            .size(self.size)
            .count(self.count);
        if let Some(quality) = self.quality {
            request = request.quality(quality);
        }
        if let Some(style) = self.style {
            request = request.style(style);
        }
        if self.inline {
            request = request.response_format(ImageResponseFormat::B64Json);
        }
        request
    }
}

/// Execute the images command.
pub async fn execute(args: ImagesArgs, client: &Client, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let request = args.to_request();
    request.validate()?;

    let spinner = (format == OutputFormat::Text).then(|| output::spinner("Generating images..."));
    let result = client.generate_images(&request).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let result = result?;

    let saved = match args.output {
        Some(ref dir) => save_all(client, &result, dir).await?,
        None => Vec::new(),
    };

    match format {
        OutputFormat::Json => CommandResult::success(ImagesOutput { result, saved }).emit()?,
        OutputFormat::Text => {
            output::success(&format!("Generated {} image(s) with {}", result.len(), args.model));
            for (index, image) in result.images.iter().enumerate() {
                output::section(&format!("Image {}", index + 1));
                match &image.source {
                    ImageSource::Url(url) => output::key_value("URL", url),
                    ImageSource::Base64(data) => {
                        output::key_value("Inline", &format!("{} base64 characters", data.len()));
                    }
                }
                if let Some(ref revised) = image.revised_prompt {
                    output::key_value("Revised prompt", revised);
                }
            }
            if let (Some(dir), false) = (&args.output, saved.is_empty()) {
                output::section(&format!("Saved to {}", dir.display()));
                for file in &saved {
                    output::key_value(&file.path.display().to_string(), &output::format_bytes(file.bytes));
                }
            }
        }
    }

    Ok(())
}

/// Download or decode every image into `dir` as `image-N.png`.
async fn save_all(client: &Client, result: &ImageResult, dir: &Path) -> Result<Vec<SavedImage>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let mut saved = Vec::with_capacity(result.len());
    for (index, image) in result.images.iter().enumerate() {
        let bytes = client
            .download_image(image)
            .await
            .with_context(|| format!("failed to fetch image {}", index + 1))?;

        let path = dir.join(file_name(index));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved image");
        saved.push(SavedImage {
            path,
            bytes: bytes.len() as u64,
        });
    }
    Ok(saved)
}

fn file_name(index: usize) -> String {
    format!("image-{}.png", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use hibana_sdk::ErrorKind;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ImagesArgs,
    }

    fn parse(argv: &[&str]) -> Result<ImagesArgs, clap::Error> {
        let mut full = vec!["images"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).map(|h| h.args)
    }

    #[test]
    fn test_defaults() {
        let request = parse(&["a red fox"]).unwrap().to_request();
        assert_eq!(request.model, "dall-e-3");
        assert_eq!(request.size, ImageSize::Square1024);
        assert_eq!(request.count, 1);
        assert!(request.response_format.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_options_map_to_request() {
        let request = parse(&[
            "a red fox", "--size", "1792x1024", "--quality", "HD", "--style", "natural", "--inline",
        ])
        .unwrap()
        .to_request();

        assert_eq!(request.size, ImageSize::Landscape1792);
        assert_eq!(request.quality, Some(ImageQuality::Hd));
        assert_eq!(request.style, Some(ImageStyle::Natural));
        assert_eq!(request.response_format, Some(ImageResponseFormat::B64Json));
    }

    #[test]
    fn test_unknown_size_rejected_by_parser() {
        let err = parse(&["a red fox", "--size", "300x300"]).err().unwrap();
        assert!(err.to_string().contains("300x300"));
    }

    #[test]
    fn test_model_limits_checked_locally() {
        let request = parse(&["a red fox", "-n", "2"]).unwrap().to_request();
        let err = request.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_file_names_are_one_based() {
        assert_eq!(file_name(0), "image-1.png");
        assert_eq!(file_name(9), "image-10.png");
    }
}
