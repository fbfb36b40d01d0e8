use std::path::PathBuf;
use std::str::FromStr;

use clap::{
    App,
    Arg,
    ArgMatches,
};
use log::warn;

use rangeserve::response::{
    Buffering,
    ResponseConfig,
};

pub struct Settings {
    pub host: String,
    pub port: u16,
    pub dir: PathBuf,
    pub max_memory_size: usize,
    pub buffering: Buffering,
    pub max_age: Option<u64>,
}

const BIND_HOST: &str = "0.0.0.0";
const BIND_PORT: u16 = 8000;
const MAX_MEMORY_SIZE: usize = 100000;

impl Settings {
    pub fn new() -> Settings {
        Settings {
            host: BIND_HOST.to_string(),
            port: BIND_PORT,
            dir: PathBuf::from("."),
            max_memory_size: MAX_MEMORY_SIZE,
            buffering: Buffering::WhenNeeded,
            max_age: None,
        }
    }

    fn bind_from_args(&mut self, arg: &ArgMatches) {
        if let Some(v) = arg.value_of("host") {
            self.host = v.to_string();
        }

        if let Some(v) = arg.value_of("port") {
            match u16::from_str_radix(v, 10) {
                Ok(port) => {
                    self.port = port;
                },
                Err(e) => {
                    warn!("invalid port {}, using {}: {}", v, self.port, e);
                },
            };
        }

        if let Some(v) = arg.value_of("dir") {
            self.dir = PathBuf::from(v);
        }

        if let Some(v) = arg.value_of("max-memory") {
            match usize::from_str(v) {
                Ok(size) => {
                    self.max_memory_size = size;
                },
                Err(e) => {
                    warn!("invalid max memory size {}, using {}: {}", v, self.max_memory_size, e);
                },
            };
        }

        if let Some(v) = arg.value_of("buffering") {
            match Buffering::from_str(v) {
                Ok(b) => {
                    self.buffering = b;
                },
                Err(e) => {
                    warn!("{}, using {:?}", e, self.buffering);
                },
            };
        }

        if let Some(v) = arg.value_of("max-age") {
            match u64::from_str(v) {
                Ok(age) => {
                    self.max_age = Some(age);
                },
                Err(e) => {
                    warn!("invalid max age {}, caching disabled: {}", v, e);
                },
            };
        }
    }

    pub fn response_config(&self) -> ResponseConfig {
        let mut config = ResponseConfig::default();
        config.max_memory_size = self.max_memory_size;
        config.buffering = self.buffering;
        config
    }

    pub fn from_args() -> Settings {
        let mut o = App::new("rangeserve");
        o = o.version(env!("CARGO_PKG_VERSION"));
        o = o.about("HTTP file server with conditional requests, byte ranges and partial PUT");
        o = o.arg(
            Arg::with_name("host")
                .long("host")
                .short("h")
                .value_name("Host or ip to bind server to.")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("port")
                .long("port")
                .short("p")
                .value_name("Port to bind server to")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("dir")
                .long("dir")
                .short("d")
                .value_name("Directory to serve and store content in")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("max-memory")
                .long("max-memory")
                .value_name("Bytes buffered in memory before spilling to disk")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("buffering")
                .long("buffering")
                .value_name("When to buffer full content")
                .possible_values(&["always", "never", "when-needed"])
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("max-age")
                .long("max-age")
                .value_name("Seconds clients may cache content")
                .takes_value(true)
                );

        let arg_matches = o.get_matches();
        let mut settings = Settings::new();
        settings.bind_from_args(&arg_matches);
        settings
    }
}
