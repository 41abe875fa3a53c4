pub mod fanout;
pub mod stream_sink;

pub use fanout::NotificationFanout;
pub use stream_sink::StreamHubSink;
