use std::path::{Path, PathBuf};

fn exe_name(name: &str) -> String {
    format!("{}{}", name, std::env::consts::EXE_SUFFIX)
}

/// A temporary directory holding a copy of the `test-binary` tool stand-in.
pub struct Workdir {
    dir: tempfile::TempDir,
}

impl Workdir {
    const TARGET_BINARY_NAME: &'static str = "test-binary";

    /// `binary` is the path of the built `test-binary`.
    pub fn new(binary: &Path) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        // copied rather than linked so the binary finds its own directory
        std::fs::copy(binary, dir.path().join(exe_name(Self::TARGET_BINARY_NAME))).unwrap();
        Self { dir }
    }

    pub fn with_exit_status(self, exit_status: i32) -> Self {
        std::fs::write(self.path().join("exit-status"), exit_status.to_string()).unwrap();
        self
    }

    pub fn with_stdout(self, stdout: impl AsRef<[u8]>) -> Self {
        std::fs::write(self.path().join("stdout"), stdout.as_ref()).unwrap();
        self
    }

    pub fn with_stderr(self, stderr: impl AsRef<[u8]>) -> Self {
        std::fs::write(self.path().join("stderr"), stderr.as_ref()).unwrap();
        self
    }

    /// Makes the binary write `contents` to the path following `flag`.
    pub fn with_output_file(self, flag: &str, contents: impl AsRef<[u8]>) -> Self {
        std::fs::write(self.path().join("output-flag"), flag).unwrap();
        std::fs::write(self.path().join("output"), contents.as_ref()).unwrap();
        self
    }

    pub fn with_file(self, name: &str, contents: impl AsRef<[u8]>) -> Self {
        std::fs::write(self.path().join(name), contents.as_ref()).unwrap();
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn test_binary(&self) -> PathBuf {
        self.dir.path().join(exe_name(Self::TARGET_BINARY_NAME))
    }

    pub fn was_called(&self) -> bool {
        self.path().join("args").exists()
    }

    pub fn args(&self) -> Args {
        Args::new(&self.path().join("args")).unwrap()
    }

    pub fn env(&self) -> Env {
        Env::new(&self.path().join("env")).unwrap()
    }
}

pub struct Args {
    args: Vec<String>,
}

impl Args {
    fn new(args_file: &Path) -> std::io::Result<Args> {
        let args = std::fs::read_to_string(args_file)?
            .lines()
            .map(|s| s.to_owned())
            .collect();
        Ok(Args { args })
    }

    pub fn assert_args(&self, args: &[impl AsRef<str>]) -> &Self {
        let args = args.iter().map(|s| s.as_ref()).collect::<Vec<_>>();
        assert_eq!(&self.args, &args);
        self
    }
}

pub struct Env {
    env: Vec<(String, String)>,
}

impl Env {
    fn new(env_file: &Path) -> std::io::Result<Self> {
        let env = std::fs::read_to_string(env_file)?
            .lines()
            .filter_map(|s| s.split_once('='))
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect();
        Ok(Env { env })
    }

    pub fn assert_var(&self, key: impl AsRef<str>, value: impl AsRef<str>) -> &Self {
        let key = key.as_ref();
        let value = value.as_ref();
        assert!(
            self.env.iter().any(|(k, v)| k == key && v == value),
            "expected {}={} in environment",
            key,
            value
        );
        self
    }

    pub fn assert_no_var(&self, key: impl AsRef<str>) -> &Self {
        let key = key.as_ref();
        assert!(
            !self.env.iter().any(|(k, _)| k == key),
            "unexpected {} in environment",
            key
        );
        self
    }
}
