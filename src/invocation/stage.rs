// Copyright 2025 sshjob contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Input payloads staged into a workspace.
//!
//! The three input kinds are resolved once at binding time: file inputs
//! and temp-file inputs are uploaded and bind to their remote path, value
//! inputs bind to their literal string and never touch the transport.

use std::io::Cursor;

use crate::transport::ByteStream;

/// The bytes behind a file or temp-file input.
pub enum InputSource {
    /// Literal in-memory contents.
    Bytes(Vec<u8>),
    /// An arbitrary readable byte stream, copied to the worker without
    /// buffering it whole.
    Stream(ByteStream),
}

impl InputSource {
    pub(crate) fn into_reader(self) -> ByteStream {
        match self {
            InputSource::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            InputSource::Stream(stream) => stream,
        }
    }
}

impl From<Vec<u8>> for InputSource {
    fn from(bytes: Vec<u8>) -> Self {
        InputSource::Bytes(bytes)
    }
}

impl From<&str> for InputSource {
    fn from(s: &str) -> Self {
        InputSource::Bytes(s.as_bytes().to_vec())
    }
}

/// One declared input of an invocation.
pub enum Input {
    /// Uploaded into the workspace under a caller-specified remote name,
    /// typically the logical port name.
    File {
        remote_name: String,
        source: InputSource,
    },
    /// Uploaded under a synthesized `tempfile.<n>.tmp` name unique
    /// within the invocation.
    TempFile { source: InputSource },
    /// Not transferred at all; the already-resolved value is bound
    /// directly as the parameter value.
    Value(String),
}

impl Input {
    pub fn file(remote_name: impl Into<String>, source: impl Into<InputSource>) -> Self {
        Input::File {
            remote_name: remote_name.into(),
            source: source.into(),
        }
    }

    pub fn temp_file(source: impl Into<InputSource>) -> Self {
        Input::TempFile {
            source: source.into(),
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Input::Value(value.into())
    }
}

/// Remote name for the `n`-th temp-file input of an invocation.
pub(crate) fn temp_file_name(n: u32) -> String {
    format!("tempfile.{n}.tmp")
}
