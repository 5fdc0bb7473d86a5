//! 不连接真实 GPU 的后端
//!
//! 创建的资源只在内存里登记，命令被原样记录下来，供测试和离线驱动检查。

pub mod command_list;
pub mod device;
pub mod recorded;

pub use command_list::HeadlessCommandList;
pub use device::{HeadlessDevice, HeadlessStats, HeadlessTlasInstance};
pub use recorded::RecordedCommand;
