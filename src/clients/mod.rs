pub mod qiniu_client;

pub use qiniu_client::QiniuClient;
