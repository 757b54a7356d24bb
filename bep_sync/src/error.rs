error_chain! {
    types {
        SyncError, SyncErrorKind, SyncResultExt, SyncResult;
    }

    links {
        Model(bep_model::Error, bep_model::ErrorKind);
    }

    errors {
        ProtocolError {
            detail: String
        } {
            description("Peer Violated The Protocol")
            display("Peer Violated The Protocol: {}", detail)
        }
        FolderNotShared {
            folder: String
        } {
            description("Peer Referenced A Folder Not Shared With It")
            display("Peer Referenced Folder {:?} Which Is Not Shared With It", folder)
        }
        IndexSequenceRegression {
            folder: String,
            previous: u64,
            received: u64
        } {
            description("Peer Index Sequence Did Not Advance")
            display("Peer Index For Folder {:?} Went From Sequence {} To {}", folder, previous, received)
        }
        UnsolicitedResponse {
            id: u64
        } {
            description("Peer Answered A Request That Was Never Made")
            display("Peer Answered Request {} Which Was Never Made", id)
        }
        PeerRemoved {
            description("Peer Was Removed From The Cluster")
            display("Peer Was Removed From The Cluster")
        }
    }
}
