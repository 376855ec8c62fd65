// This file is part of xrpl-nft-monitor.
// Copyright (C) 2025 xrpl-nft-monitor contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;
use std::env;

const CONFIG_FILE_ENV_VAR: &str = "CONFIG_FILE";
const CONFIG_FILE_DEFAULT: &str = "config.yaml";
const CONFIG_ENV_PREFIX: &str = "APP__";
const CONFIG_ENV_SPLIT: &str = "__";

/// Extension trait to load a configuration from the default configuration
/// file (overridable via the `CONFIG_FILE` env var) merged with `APP__`
/// prefixed environment variables; `__` separates nesting levels.
pub trait ConfigExt
where
    Self: for<'de> Deserialize<'de>,
{
    fn load() -> Result<Self, figment::Error> {
        let config_file =
            env::var(CONFIG_FILE_ENV_VAR).unwrap_or_else(|_| CONFIG_FILE_DEFAULT.to_string());

        Figment::new()
            .merge(Yaml::file(config_file))
            .merge(Env::prefixed(CONFIG_ENV_PREFIX).split(CONFIG_ENV_SPLIT))
            .extract()
    }
}

impl<T> ConfigExt for T where T: for<'de> Deserialize<'de> {}

#[cfg(test)]
mod tests {
    use crate::config::ConfigExt;
    use serde::Deserialize;
    use std::{env, fs::File, io::Write};

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    struct Config {
        foo: Foo,
    }

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    struct Foo {
        bar: String,
        baz: u32,
    }

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().expect("temp dir can be created");
        let config_file = dir.path().join("config.yaml");
        let mut file = File::create(&config_file).expect("config file can be created");
        file.write_all(b"foo:\n  bar: bar\n  baz: 42\n")
            .expect("config file can be written");

        unsafe {
            env::set_var("CONFIG_FILE", config_file.display().to_string());
            env::set_var("APP__FOO__BAZ", "666");
        }

        let config = Config::load();
        assert_eq!(
            config.ok(),
            Some(Config {
                foo: Foo {
                    bar: "bar".to_string(),
                    baz: 666,
                }
            })
        );
    }
}
