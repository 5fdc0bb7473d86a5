//! 基础容器与工具
//!
//! - [`bag::Bag`]：稳定索引的对象池，弹出后留下空位供复用
//! - [`integer_set::IntegerSet`]：以同一索引域为键的位集合
//! - [`id_issuer::IdIssuer`]：显式的对象 ID 分配服务

pub mod bag;
pub mod id_issuer;
pub mod integer_set;
pub mod stable_index;
