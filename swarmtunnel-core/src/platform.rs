//! Host platform detection and cloudflared release asset selection.

/// Operating system family, as far as launchers and binaries care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Windows,
    MacOs,
    Linux,
}

impl Os {
    /// Map `std::env::consts::OS`-style names. Anything that is not Windows
    /// or macOS is treated as Linux.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "windows" => Self::Windows,
            "macos" | "darwin" => Self::MacOs,
            _ => Self::Linux,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "darwin",
            Self::Linux => "linux",
        }
    }
}

/// CPU architecture in cloudflared's naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
    Arm,
    X386,
}

impl Arch {
    /// Map machine names (`uname -m` or `std::env::consts::ARCH`). Unknown
    /// names default to amd64.
    pub fn from_machine(machine: &str) -> Self {
        match machine.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Self::Amd64,
            "aarch64" | "arm64" | "armv8l" => Self::Arm64,
            "armv7l" | "arm" => Self::Arm,
            "i386" | "i686" | "x86" => Self::X386,
            _ => Self::Amd64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Arm => "arm",
            Self::X386 => "386",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this binary runs on.
    pub fn current() -> Self {
        Self {
            os: Os::from_name(std::env::consts::OS),
            arch: Arch::from_machine(std::env::consts::ARCH),
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.os.as_str(), self.arch.as_str())
    }
}

/// File name of the cloudflared executable.
pub fn cloudflared_binary_name(os: Os) -> &'static str {
    match os {
        Os::Windows => "cloudflared.exe",
        _ => "cloudflared",
    }
}

/// How a release asset has to be unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Ready-to-run executable.
    Binary,
    /// Gzipped tarball containing the executable.
    Tarball,
}

/// A downloadable cloudflared release asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudflaredAsset {
    pub url: String,
    /// Name the download is saved under.
    pub file_name: &'static str,
    pub kind: AssetKind,
}

/// Pick the cloudflared release asset for `platform`.
pub fn cloudflared_asset(platform: Platform, base_url: &str) -> CloudflaredAsset {
    let base = base_url.trim_end_matches('/');
    match platform.os {
        Os::Windows => {
            let arch = match platform.arch {
                Arch::Arm64 => "arm64",
                _ => "amd64",
            };
            CloudflaredAsset {
                url: format!("{base}/cloudflared-windows-{arch}.exe"),
                file_name: "cloudflared.exe",
                kind: AssetKind::Binary,
            }
        }
        Os::MacOs => {
            let arch = match platform.arch {
                Arch::Arm64 => "arm64",
                _ => "amd64",
            };
            CloudflaredAsset {
                url: format!("{base}/cloudflared-darwin-{arch}.tgz"),
                file_name: "cloudflared.tgz",
                kind: AssetKind::Tarball,
            }
        }
        Os::Linux => CloudflaredAsset {
            url: format!("{base}/cloudflared-linux-{}", platform.arch.as_str()),
            file_name: "cloudflared",
            kind: AssetKind::Binary,
        },
    }
}
