mod data_reader;
mod data_reader_file;
mod data_reader_http;

pub use data_reader::{DataReader, DataReaderTrait};
pub use data_reader_file::DataReaderFile;
pub use data_reader_http::DataReaderHttp;
