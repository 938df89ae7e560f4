use formatx::formatx;
use std::fmt::Debug;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Somewhere the results of a run can be written to, one stream per location key
/// (e.g. `house_1__consumption`).
pub trait Output: Debug {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
    /// Whether this output can be considered a no-op and therefore that any code that only writes to the output can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Writes every location to its own file in a directory. The file name is the template
/// with its placeholder replaced by the location key.
#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_template: String,
}

impl FileOutput {
    pub fn new(directory_path: PathBuf, file_template: String) -> Self {
        Self {
            directory_path,
            file_template,
        }
    }

    fn path_for(&self, location_key: &str) -> anyhow::Result<PathBuf> {
        let file_name = formatx!(&self.file_template, location_key)
            .map_err(|e| anyhow::anyhow!("Invalid output file template: {e:?}"))?;
        Ok(self.directory_path.join(file_name))
    }
}

impl Output for FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        fs::create_dir_all(&self.directory_path)?;
        Ok(BufWriter::new(File::create(self.path_for(location_key)?)?))
    }
}

impl<T: Output> Output for &T {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        (**self).writer_for_location_key(location_key)
    }

    fn is_noop(&self) -> bool {
        (**self).is_noop()
    }
}

/// An output that goes to nowhere/ a "sink"/ /dev/null.
#[derive(Debug, Default)]
pub struct SinkOutput;

impl Output for SinkOutput {
    fn writer_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_output_path() {
        let output = FileOutput::new(PathBuf::from("out"), "demo__{}.csv".into());
        assert_eq!(
            output.path_for("house_1__events").unwrap(),
            PathBuf::from("out/demo__house_1__events.csv")
        );
    }

    #[test]
    fn test_sink_output_is_noop() {
        assert!(SinkOutput.is_noop());
        assert!((&SinkOutput).is_noop());
    }
}
