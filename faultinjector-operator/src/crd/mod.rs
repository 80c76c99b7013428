//! Custom Resource Definitions for the fault-injector operator.
//!
//! - [`FaultInjector`]: a declared fault-injection task

mod fault_injector;

pub use fault_injector::{
    FAULT_INJECTOR_CRD_NAME, FaultInjector, FaultInjectorSpec, FaultType,
};
