#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use crossbuild::builder::{archive, vendor};
use serde_json::{json, Value};
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const VERSIONS: &[(&str, &str)] = &[
    ("binutils", "2.43.1"),
    ("gcc", "14.2.0"),
    ("linux", "6.6.58"),
    ("musl", "1.2.5"),
    ("glibc", "2.40"),
];

/// A project directory with a `build.json` whose packages are local
/// `file://` tarballs.
pub struct TestProject {
    _tmp: TempDir,
    pub root: PathBuf,
    pub upstream: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().join("project");
        let upstream = tmp.path().join("upstream");
        fs::create_dir_all(&root).expect("create project dir");

        for (name, version) in VERSIONS {
            make_tarball(&upstream, name, version);
        }

        let project = Self {
            _tmp: tmp,
            root,
            upstream,
        };
        project.write_config(&project.default_config());
        project
    }

    pub fn tarball(&self, name: &str) -> PathBuf {
        let version = VERSIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .expect("known package");
        self.upstream.join(format!("{name}-{version}.tar.xz"))
    }

    pub fn default_config(&self) -> Value {
        let mut packages = serde_json::Map::new();
        for (name, version) in VERSIONS {
            let tarball = self.tarball(name);
            let sha256 = vendor::sha256_file(&tarball).expect("hash fixture");
            packages.insert(
                (*name).to_string(),
                json!({
                    "version": version,
                    "url": format!("file://{}", tarball.display()),
                    "sha256": sha256,
                }),
            );
        }

        json!({
            "metadata": { "version": "0.9.0" },
            "build": {
                "directories": { "build": "build", "output": "artifacts", "packages": "packages" },
                "architecture": { "default": "x86_64", "supported": ["x86_64", "aarch64"] },
                "toolchain": { "types": ["musl", "gnu"], "default": "musl" },
                "packages": packages,
            }
        })
    }

    pub fn write_config(&self, config: &Value) {
        fs::write(
            self.root.join("build.json"),
            serde_json::to_string_pretty(config).expect("serialize config"),
        )
        .expect("write build.json");
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Lay out a finished toolchain under `artifacts/<name>` without
    /// building anything.
    pub fn fake_toolchain(&self, name: &str, triple: &str) {
        let prefix = self.path(&format!("artifacts/{name}"));
        let bin = prefix.join("bin");
        fs::create_dir_all(&bin).expect("create bin");
        for tool in ["gcc", "g++", "ld"] {
            fs::write(bin.join(format!("{triple}-{tool}")), "#!/bin/sh\n").expect("write tool");
        }
        let libdir = prefix.join(triple).join("usr/lib");
        fs::create_dir_all(&libdir).expect("create sysroot");
        fs::write(libdir.join("libc.a"), "!<arch>\n").expect("write libc.a");
        fs::write(prefix.join("env.sh"), format!("export TARGET=\"{triple}\"\n"))
            .expect("write env.sh");
    }

    /// `crossbuild` run from the project root with a clean environment.
    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("crossbuild");
        for var in [
            "ARCH",
            "TOOLCHAIN",
            "BUILD_DIR",
            "ARTIFACTS_DIR",
            "PACKAGES_DIR",
            "SOURCE_DATE_EPOCH",
            "DEBUG",
            "LOG_TO_FILE",
            "JOBS",
            "CROSSBUILD_CONFIG",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd.current_dir(&self.root);
        cmd
    }
}

fn make_tarball(upstream: &Path, name: &str, version: &str) {
    let tree = upstream.join("trees").join(name);
    fs::create_dir_all(tree.join("scripts")).expect("create tree");
    write_script(&tree.join("configure"), "#!/bin/sh\nexit 0\n");
    fs::write(tree.join("VERSION"), format!("{version}\n")).expect("write VERSION");

    let out = upstream.join(format!("{name}-{version}.tar.xz"));
    archive::pack_dir(&tree, &format!("{name}-{version}"), &out, 0).expect("pack fixture");
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

/// `make` stand-in: logs `<cwd basename> <args>` to `$FAKE_MAKE_LOG` and, on
/// install targets, creates the file the current stage is expected to leave
/// behind. With `FAKE_MAKE_MODE=noop` it only logs.
const FAKE_MAKE: &str = r#"#!/bin/sh
stage="$(basename "$(pwd)")"
echo "$stage $*" >> "$FAKE_MAKE_LOG"
[ "$FAKE_MAKE_MODE" = noop ] && exit 0

p="$FAKE_PREFIX"
t="$FAKE_TRIPLE"
case "$*" in
  *headers_install*)
    mkdir -p "$p/$t/usr/include/linux" && touch "$p/$t/usr/include/linux/version.h" ;;
  *install*)
    mkdir -p "$p/bin"
    case "$stage" in
      binutils) touch "$p/bin/$t-ld" ;;
      gcc-stage1) touch "$p/bin/$t-gcc" ;;
      libc) mkdir -p "$p/$t/usr/lib" && touch "$p/$t/usr/lib/libc.a" ;;
      gcc) touch "$p/bin/$t-g++" ;;
    esac ;;
esac
exit 0
"#;

/// Host tools that only need to exist for preflight.
const STUB_TOOLS: &[&str] = &[
    "gcc", "g++", "bison", "flex", "gawk", "m4", "perl", "rsync", "python3",
];

impl TestProject {
    /// Directory of fake host tools; see [`FAKE_MAKE`].
    pub fn fake_host_tools(&self) -> PathBuf {
        let bin = self.upstream.join("fakebin");
        fs::create_dir_all(&bin).expect("create fakebin");
        write_script(&bin.join("make"), FAKE_MAKE);
        for tool in STUB_TOOLS {
            write_script(&bin.join(tool), "#!/bin/sh\nexit 0\n");
        }
        bin
    }

    pub fn make_log(&self) -> PathBuf {
        self.upstream.join("make.log")
    }

    /// `cmd()` with the fake host tools first on `PATH`, building into
    /// `artifacts/<name>`.
    pub fn pipeline_cmd(&self, name: &str, triple: &str, mode: &str) -> Command {
        let bin = self.fake_host_tools();
        let mut paths = vec![bin];
        paths.extend(std::env::split_paths(
            &std::env::var_os("PATH").unwrap_or_default(),
        ));
        let path: OsString = std::env::join_paths(paths).expect("join PATH");

        let mut cmd = self.cmd();
        cmd.env("PATH", path)
            .env("FAKE_MAKE_LOG", self.make_log())
            .env("FAKE_MAKE_MODE", mode)
            .env("FAKE_PREFIX", self.path(&format!("artifacts/{name}")))
            .env("FAKE_TRIPLE", triple);
        cmd
    }

    /// Lines `make` logged so far.
    pub fn make_calls(&self) -> Vec<String> {
        fs::read_to_string(self.make_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
