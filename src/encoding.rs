use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

/// Raw RGBA frames piped into a system `ffmpeg` on a worker thread.
pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
    frame_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EncodeJob {
    size: String,
    fps: String,
    output_path: PathBuf,
}

impl FfmpegPipe {
    pub fn spawn(width: u32, height: u32, frame_interval: Duration, output_path: &Path) -> Result<Self> {
        Self::spawn_with_binary(Path::new("ffmpeg"), width, height, frame_interval, output_path)
    }

    fn spawn_with_binary(
        ffmpeg_path: &Path,
        width: u32,
        height: u32,
        frame_interval: Duration,
        output_path: &Path,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("cannot encode a {width}x{height} video");
        }
        validate_output_path(output_path)?;

        let job = EncodeJob {
            size: format!("{width}x{height}"),
            fps: fps_for_interval(frame_interval),
            output_path: output_path.to_path_buf(),
        };
        debug!(size = %job.size, fps = %job.fps, output = %job.output_path.display(), "spawning ffmpeg");

        let ffmpeg_path = ffmpeg_path.to_path_buf();
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let worker = thread::Builder::new()
            .name("glyphrain-ffmpeg-encoder".to_owned())
            .spawn(move || run_ffmpeg_process(&ffmpeg_path, receiver, &job))
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            frame_len: width as usize * height as usize * 4,
        })
    }

    /// Queue one frame. If the worker has already stopped, its own error is
    /// returned so the real cause (for example a missing ffmpeg) surfaces.
    pub fn write_frame(&mut self, rgba_frame: Vec<u8>) -> Result<()> {
        if rgba_frame.len() != self.frame_len {
            bail!(
                "frame has {} bytes, encoder expects {}",
                rgba_frame.len(),
                self.frame_len
            );
        }
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        if sender.send(rgba_frame).is_ok() {
            return Ok(());
        }

        drop(self.sender.take());
        match self.join_worker() {
            Err(error) => Err(error.context("failed to enqueue frame for ffmpeg")),
            Ok(()) => Err(anyhow!(
                "failed to enqueue frame for ffmpeg: encoder stopped before all frames were written"
            )),
        }
    }

    pub fn finish(mut self) -> Result<()> {
        drop(self.sender.take());
        self.join_worker()
    }

    fn join_worker(&mut self) -> Result<()> {
        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("ffmpeg worker thread panicked")),
        }
    }
}

/// Frame rate string for ffmpeg, as an exact `1000/ms` rational.
pub fn fps_for_interval(interval: Duration) -> String {
    let millis = interval.as_millis().max(1);
    if 1000 % millis == 0 {
        (1000 / millis).to_string()
    } else {
        format!("1000/{millis}")
    }
}

fn validate_output_path(output_path: &Path) -> Result<()> {
    let path_str = output_path.to_string_lossy();
    if path_str.is_empty() {
        bail!("output path is empty");
    }
    if path_str.len() > 1024 {
        bail!("output path is suspiciously long");
    }
    if path_str.chars().any(|c| c.is_control()) {
        bail!("output path contains invalid control characters");
    }
    Ok(())
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    receiver: mpsc::Receiver<Vec<u8>>,
    job: &EncodeJob,
) -> Result<()> {
    let args = ffmpeg_args(job);
    let mut command = Command::new(ffmpeg_path);
    command
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            anyhow!(
                "ffmpeg executable not found (resolved_path={}). Install ffmpeg or render to .png instead.",
                ffmpeg_path.display()
            )
        } else {
            anyhow!(
                "failed to spawn ffmpeg process (resolved_path={}, args='{}'): {error}",
                ffmpeg_path.display(),
                args.join(" ")
            )
        }
    })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    while let Ok(frame) = receiver.recv() {
        stdin
            .write_all(&frame)
            .context("failed to write frame to ffmpeg stdin")?;
    }

    stdin.flush().context("failed to flush ffmpeg stdin")?;
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        return Err(anyhow!(
            "ffmpeg failed with status {status} (args='{}', stderr_tail='{}')",
            args.join(" "),
            stderr_tail
        ));
    }

    Ok(())
}

fn ffmpeg_args(job: &EncodeJob) -> Vec<String> {
    let mut args = ffmpeg_rawvideo_input_args(&job.size, &job.fps);
    args.extend(ffmpeg_output_args(&job.output_path));
    args.push(job.output_path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_rawvideo_input_args(size: &str, fps: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        size.to_owned(),
        "-r".to_owned(),
        fps.to_owned(),
        "-i".to_owned(),
        "-".to_owned(),
        "-an".to_owned(),
    ]
}

/// Codec arguments picked from the container extension.
pub fn ffmpeg_output_args(output_path: &Path) -> Vec<String> {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let args: &[&str] = match ext.as_str() {
        "mp4" | "m4v" => &["-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart"],
        "mov" => &["-c:v", "prores_ks", "-profile:v", "3", "-pix_fmt", "yuv422p10le"],
        "webm" => &["-c:v", "libvpx-vp9", "-pix_fmt", "yuv420p"],
        "gif" => &[],
        _ => &["-pix_fmt", "yuv420p"],
    };
    args.iter().map(|arg| (*arg).to_owned()).collect()
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let chars = s.chars().collect::<Vec<_>>();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect::<String>().trim().to_owned()
}
