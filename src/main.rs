use std::env;
use std::ffi::OsString;
use std::process::ExitCode;

use cpmfs::consts::SECTOR_SIZE;
use cpmfs::driver::file_drive::FileDrive;
use cpmfs::fuse::CpmFuse;
use cpmfs::{CpmFs, Result};
use fuser::MountOption;
use log::{error, info};

fn main() -> ExitCode {
    env_logger::init();

    let mut args = env::args_os().skip(1);
    let (image, mountpoint) = match (args.next(), args.next()) {
        (Some(image), Some(mountpoint)) => (image, mountpoint),
        _ => {
            eprintln!("usage: cpmfs <image> <mountpoint>");
            return ExitCode::FAILURE;
        }
    };

    match run(image, mountpoint) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(image: OsString, mountpoint: OsString) -> Result<()> {
    let drive = FileDrive::open(&image, SECTOR_SIZE)?;
    let mut fs = CpmFs::mount(drive)?;

    for entry in fs.list()? {
        info!("{}", entry);
    }
    info!("Block map:\n{}", fs.free_map()?);

    info!("Mounting {:?} on {:?}", image, mountpoint);
    let options = [MountOption::FSName("cpmfs".to_string())];
    fuser::mount2(CpmFuse::new(fs), &mountpoint, &options)?;
    Ok(())
}
