use sluice_rest::Metadata;

/// Assemble the metadata block reported with a creation request.
pub fn collect(command: &str) -> Metadata {
    Metadata {
        release: env!("CARGO_PKG_VERSION").to_string(),
        git_version: option_env!("GIT_REVISION").unwrap_or("unknown").to_string(),
        build: option_env!("BUILD_ID").unwrap_or("dev").to_string(),
        platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        hostname: gethostname::gethostname().to_string_lossy().into_owned(),
        no_file_limit: nofile_limit(),
        command: command.to_string(),
    }
}

/// Open-file limit of the current process, 0 when it can't be read.
#[cfg(unix)]
fn nofile_limit() -> u64 {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes into the out-parameter.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc == 0 {
        limit.rlim_cur as u64
    } else {
        0
    }
}

#[cfg(not(unix))]
fn nofile_limit() -> u64 {
    0
}
