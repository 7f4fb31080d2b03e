//! Readout logs on a FAT-formatted SD card
//!
//! SD card access is blocking, like everything else on this SPI bus. Each
//! operation opens the volume, the root directory and the file, and closes
//! them again, so a power cut between two operations leaves a consistent
//! FAT; only the write in flight can be torn.

use canopy::storage::{LogMedium, StorageError};
use embedded_sdmmc::{Error, Mode, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::{error, info};

/// FAT timestamps are not used for anything; every file gets this one.
pub struct FixedTimeSource;

impl TimeSource for FixedTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 56,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

pub struct SdMedium<S, D>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
{
    volume_mgr: VolumeManager<SdCard<S, D>, FixedTimeSource, 4, 4, 1>,
    mounted: bool,
}

fn storage_error(e: Error<SdCardError>) -> StorageError {
    match e {
        Error::NotFound => StorageError::NotFound,
        Error::DiskFull => StorageError::Full,
        e => {
            error!("SD card error: {:?}", e);
            StorageError::Io
        }
    }
}

impl<S, D> SdMedium<S, D>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
{
    pub fn new(sd_card: SdCard<S, D>) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, FixedTimeSource),
            mounted: false,
        }
    }

    fn ensure_mounted(&self) -> Result<(), StorageError> {
        if self.mounted {
            Ok(())
        } else {
            Err(StorageError::NotMounted)
        }
    }
}

impl<S, D> LogMedium for SdMedium<S, D>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
{
    fn mount(&mut self) -> Result<(), StorageError> {
        let size = self
            .volume_mgr
            .device(|card| card.num_bytes())
            .map_err(|e| {
                error!("SD card not responding: {:?}", e);
                StorageError::Io
            })?;

        // Opening the volume proves there is a readable FAT on the card.
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(storage_error)?;
        volume0.close().map_err(storage_error)?;

        info!("SD card mounted, {} bytes", size);
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.ensure_mounted()?;

        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(storage_error)?;
        let root_dir = volume0.open_root_dir().map_err(storage_error)?;
        let file = root_dir
            .open_file_in_dir(name, Mode::ReadWriteCreateOrAppend)
            .map_err(storage_error)?;

        file.write(bytes).map_err(storage_error)?;

        file.close().map_err(storage_error)?;
        root_dir.close().map_err(storage_error)?;
        volume0.close().map_err(storage_error)
    }

    fn read_to_end(&mut self, name: &str, out: &mut alloc::vec::Vec<u8>) -> Result<(), StorageError> {
        self.ensure_mounted()?;

        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(storage_error)?;
        let root_dir = volume0.open_root_dir().map_err(storage_error)?;
        let file = root_dir
            .open_file_in_dir(name, Mode::ReadOnly)
            .map_err(storage_error)?;

        let mut chunk = [0u8; 256];
        loop {
            let read = file.read(&mut chunk).map_err(storage_error)?;
            if read == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..read]);
        }

        file.close().map_err(storage_error)?;
        root_dir.close().map_err(storage_error)?;
        volume0.close().map_err(storage_error)
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.ensure_mounted()?;

        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(storage_error)?;
        let root_dir = volume0.open_root_dir().map_err(storage_error)?;

        root_dir.delete_file_in_dir(name).map_err(storage_error)?;

        root_dir.close().map_err(storage_error)?;
        volume0.close().map_err(storage_error)
    }
}
