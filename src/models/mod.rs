mod host;
mod topology;
mod views;

pub use host::{rack_name, Host};
pub use topology::{
    group_role, BaseNetworks, BondSpec, InterfaceType, LinkSpec, StaticInterface, Topology, Vif,
    VlanSpec,
};
pub use views::*;
