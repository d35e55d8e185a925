//! Well-known keys shared by every executive and algorithm.
//!
//! Each accessor interns its key on first use and caches the handle, so
//! lookups after startup never touch the key table. [`register_all`]
//! interns the whole vocabulary eagerly, which lets callers resolve keys by
//! name (e.g. from a pipeline file) before any algorithm has run.

use crate::info::{Key, KeyKind};

macro_rules! info_keys {
    ($location:literal; $($(#[$meta:meta])* $fn_name:ident => $name:literal : $kind:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            pub fn $fn_name() -> Key {
                static KEY: std::sync::OnceLock<Key> = std::sync::OnceLock::new();
                *KEY.get_or_init(|| Key::intern($name, $location, KeyKind::$kind))
            }
        )+

        pub(super) fn register() {
            $( let _ = $fn_name(); )+
        }
    };
}

/// Port requirement and parameter keys.
pub mod algorithm {
    use super::*;

    info_keys! { "Algorithm";
        /// Input port may have zero connections.
        input_is_optional => "INPUT_IS_OPTIONAL": Integer,
        /// Input port may have more than one connection.
        input_is_repeatable => "INPUT_IS_REPEATABLE": Integer,
        input_required_data_type => "INPUT_REQUIRED_DATA_TYPE": String,
        input_required_fields => "INPUT_REQUIRED_FIELDS": InformationVector,
        input_arrays_to_process => "INPUT_ARRAYS_TO_PROCESS": InformationVector,
        input_port => "INPUT_PORT": Integer,
        input_connection => "INPUT_CONNECTION": Integer,
        port_requirements_filled => "PORT_REQUIREMENTS_FILLED": Integer,
        field_association => "FIELD_ASSOCIATION": Integer,
        field_name => "FIELD_NAME": String,
        field_attribute_type => "FIELD_ATTRIBUTE_TYPE": Integer,
    }
}

/// Request identities and per-port bookkeeping used by every executive.
pub mod executive {
    use super::*;

    info_keys! { "Executive";
        /// Output port index that triggered the current request.
        from_output_port => "FROM_OUTPUT_PORT": Integer,
        request_information => "REQUEST_INFORMATION": Integer,
        request_update_extent => "REQUEST_UPDATE_EXTENT": Integer,
        request_data => "REQUEST_DATA": Integer,
        request_pipeline_modified_time => "REQUEST_PIPELINE_MODIFIED_TIME": Integer,
        data_object => "DATA_OBJECT": DataObject,
        data_type_name => "DATA_TYPE_NAME": String,
        release_data => "RELEASE_DATA": Integer,
    }
}

/// Extent and piece negotiation keys published by streaming executives.
pub mod streaming {
    use super::*;

    info_keys! { "StreamingDemandDrivenPipeline";
        /// Sub-region a consumer currently needs: six integers.
        update_extent => "UPDATE_EXTENT": IntegerVector,
        /// Full producible domain: six integers.
        whole_extent => "WHOLE_EXTENT": IntegerVector,
        maximum_number_of_pieces => "MAXIMUM_NUMBER_OF_PIECES": Integer,
        update_piece_number => "UPDATE_PIECE_NUMBER": Integer,
        update_number_of_pieces => "UPDATE_NUMBER_OF_PIECES": Integer,
        update_number_of_ghost_levels => "UPDATE_NUMBER_OF_GHOST_LEVELS": Integer,
        extent_type => "EXTENT_TYPE": Integer,
    }

    /// Keys describing a consumer's request, in the order they are forwarded.
    pub fn request_keys() -> [Key; 4] {
        [
            update_extent(),
            update_piece_number(),
            update_number_of_pieces(),
            update_number_of_ghost_levels(),
        ]
    }
}

/// Intern the full key vocabulary.
pub fn register_all() {
    algorithm::register();
    executive::register();
    streaming::register();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_are_stable() {
        assert_eq!(streaming::update_extent(), streaming::update_extent());
        assert_ne!(streaming::update_extent(), streaming::whole_extent());
    }

    #[test]
    fn test_register_all_enables_lookup_by_name() {
        register_all();
        assert_eq!(
            Key::lookup("StreamingDemandDrivenPipeline", "WHOLE_EXTENT"),
            Some(streaming::whole_extent())
        );
        assert_eq!(
            Key::lookup("Executive", "FROM_OUTPUT_PORT").map(|k| k.kind()),
            Some(KeyKind::Integer)
        );
    }
}
