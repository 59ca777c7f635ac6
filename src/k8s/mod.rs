pub mod client;

pub use client::K8sClient;
