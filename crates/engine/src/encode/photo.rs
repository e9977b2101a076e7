//! Photo encoding through the ImageMagick CLI.

use super::{EncodeError, STDERR_TAIL_LINES};
use mediapress_config::PhotoFormat;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Build the `magick` invocation for one photo.
///
/// `-auto-orient` bakes the EXIF rotation in; the `-define` hints keep
/// orientation and EXIF across formats. The output is written with an
/// explicit format prefix (`avif:/path.tmp`) so the helper cannot guess
/// a format from the `.tmp` suffix.
pub fn build_photo_command(
    program: &str,
    input: &Path,
    temp_output: &Path,
    format: PhotoFormat,
    quality: u32,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg(input)
        .arg("-auto-orient")
        .arg("-quality")
        .arg(quality.to_string())
        .arg("-define")
        .arg("heic:preserve-orientation=true")
        .arg("-define")
        .arg("avif:preserve-exif=true")
        .arg("-define")
        .arg("webp:preserve-exif=true")
        .arg(format!("{}:{}", format.extension(), temp_output.display()));
    cmd
}

/// Run a photo encode under a deadline.
///
/// Stderr is drained on a separate thread; on a non-zero exit its tail is
/// attached to the error. Deadline expiry kills the child.
pub fn run_photo_encode(
    program: &str,
    input: &Path,
    temp_output: &Path,
    format: PhotoFormat,
    quality: u32,
    timeout: Duration,
) -> Result<(), EncodeError> {
    let mut cmd = build_photo_command(program, input, temp_output, format, quality);
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let stderr = child.stderr.take().expect("stderr was piped");

    let collector = std::thread::spawn(move || {
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            let _ = collector.join();
            return Err(EncodeError::Timeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let stderr_tail = collector.join().unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(EncodeError::Failed {
                code,
                stderr: stderr_tail,
            }),
            None => Err(EncodeError::Terminated {
                stderr: stderr_tail,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    #[test]
    fn test_photo_command_shape() {
        let cmd = build_photo_command(
            "magick",
            Path::new("/src/IMG_001.heic"),
            Path::new("/dest/2024-03-15_IMG_001_001.avif.tmp"),
            PhotoFormat::Avif,
            80,
        );
        let args = get_command_args(&cmd);

        assert_eq!(cmd.get_program(), OsStr::new("magick"));
        assert_eq!(args[0], "/src/IMG_001.heic");
        assert!(args.contains(&"-auto-orient".to_string()));
        assert!(has_flag_with_value(&args, "-quality", "80"));
        assert_eq!(
            args.last().unwrap(),
            "avif:/dest/2024-03-15_IMG_001_001.avif.tmp"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let fake = dir.path().join("hung-magick.sh");
        std::fs::write(&fake, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let start = Instant::now();
        let result = run_photo_encode(
            fake.to_str().unwrap(),
            Path::new("/src/a.jpg"),
            Path::new("/tmp/ignored.avif.tmp"),
            PhotoFormat::Avif,
            80,
            Duration::from_millis(300),
        );

        assert!(matches!(result, Err(EncodeError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let result = run_photo_encode(
            "definitely-not-a-real-encoder",
            Path::new("/src/a.jpg"),
            Path::new("/tmp/a.avif.tmp"),
            PhotoFormat::Avif,
            80,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(EncodeError::Io(_))));
    }

    #[test]
    fn test_nonzero_exit_reported_with_code() {
        let result = run_photo_encode(
            "false",
            Path::new("/src/a.jpg"),
            Path::new("/tmp/a.avif.tmp"),
            PhotoFormat::Avif,
            80,
            Duration::from_secs(5),
        );
        match result {
            Err(EncodeError::Failed { code, .. }) => assert_eq!(code, 1),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    // For any valid quality and paths, the built command carries every
    // required argument.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_photo_command_completeness(
            input in "[a-zA-Z0-9_/.-]{1,40}",
            output in "[a-zA-Z0-9_/.-]{1,40}",
            quality in 1u32..=100,
            format in prop_oneof![Just(PhotoFormat::Avif), Just(PhotoFormat::Webp)],
        ) {
            let cmd = build_photo_command(
                "magick",
                &PathBuf::from(&input),
                &PathBuf::from(&output),
                format,
                quality,
            );
            let args = get_command_args(&cmd);

            prop_assert_eq!(args[0].clone(), input);
            prop_assert!(args.contains(&"-auto-orient".to_string()));
            prop_assert!(has_flag_with_value(&args, "-quality", &quality.to_string()));
            prop_assert!(has_flag_with_value(
                &args,
                "-define",
                "heic:preserve-orientation=true"
            ));
            prop_assert!(has_flag_with_value(&args, "-define", "avif:preserve-exif=true"));
            prop_assert!(has_flag_with_value(&args, "-define", "webp:preserve-exif=true"));

            let expected_sink = format!("{}:{}", format.extension(), output);
            prop_assert_eq!(args.last().unwrap().clone(), expected_sink);
        }
    }
}
