//! opendm-store - Durable inventory for the OpenDM gateway
//!
//! A narrow KV facade ([`KvStore`]) over whichever store is wired in
//! (etcd in production, an in-process map in tests), and the two
//! cache-fronted repositories built on it: [`DeviceRepository`] for
//! `DeviceRecord` rows and [`ComponentRepository`] for `HwCompRecord`
//! rows scoped by device uuid.

pub mod component;
pub mod device;
pub mod etcd;
pub mod keys;
pub mod kv;
pub mod mem;

pub use component::ComponentRepository;
pub use device::DeviceRepository;
pub use etcd::EtcdStore;
pub use kv::{KvStore, StoreError};
pub use mem::MemStore;
