use bep_util::device::DeviceId;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }

    errors {
        FolderNotShared {
            folder: String,
            device: DeviceId
        } {
            description("Folder Is Not Shared With The Device")
            display("Folder {:?} Is Not Shared With Device {:?}", folder, device)
        }
        IndexSequenceRegression {
            folder: String,
            previous: u64,
            received: u64
        } {
            description("Index Carried A Sequence That Did Not Advance")
            display("Index For Folder {:?} Went From Sequence {} To {}", folder, previous, received)
        }
        UnknownPeer {
            device: DeviceId
        } {
            description("Device Is Not Part Of The Cluster")
            display("Device {:?} Is Not Part Of The Cluster", device)
        }
        UnknownFolder {
            folder: String
        } {
            description("Folder Is Not Part Of The Cluster")
            display("Folder {:?} Is Not Part Of The Cluster", folder)
        }
        MalformedFile {
            name: String
        } {
            description("File Block List Is Inconsistent With Its Size")
            display("File {:?} Has A Block List Inconsistent With Its Size", name)
        }
        StorageFailure {
            cause: String
        } {
            description("Persistent Storage Failed")
            display("Persistent Storage Failed: {}", cause)
        }
    }
}
